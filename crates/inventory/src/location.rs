use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, Entity, LocationId, WarehouseId};

/// A physical storage location inside a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub code: String,
    pub warehouse_id: WarehouseId,
    pub zone: Option<String>,
    /// Locked locations accept no inbound stock (cycle count, damage, ...).
    pub locked: bool,
}

impl Location {
    pub fn new(
        id: LocationId,
        code: impl Into<String>,
        warehouse_id: WarehouseId,
    ) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("location code cannot be empty"));
        }
        Ok(Self {
            id,
            code,
            warehouse_id,
            zone: None,
            locked: false,
        })
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Fails when the location cannot receive stock.
    pub fn ensure_accepts_stock(&self) -> DomainResult<()> {
        if self.locked {
            return Err(DomainError::LocationLocked(self.code.clone()));
        }
        Ok(())
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> LocationId {
        self.id
    }
}

/// Restricts which locations an allocation may draw from.
///
/// Passed explicitly by the caller (e.g. the warehouses a user may pick
/// from). An empty set behaves like `Any`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LocationFilter {
    #[default]
    Any,
    Warehouses(BTreeSet<WarehouseId>),
    Locations(BTreeSet<LocationId>),
}

impl LocationFilter {
    pub fn warehouses(ids: impl IntoIterator<Item = WarehouseId>) -> Self {
        Self::Warehouses(ids.into_iter().collect())
    }

    pub fn locations(ids: impl IntoIterator<Item = LocationId>) -> Self {
        Self::Locations(ids.into_iter().collect())
    }

    pub fn is_unrestricted(&self) -> bool {
        match self {
            LocationFilter::Any => true,
            LocationFilter::Warehouses(set) => set.is_empty(),
            LocationFilter::Locations(set) => set.is_empty(),
        }
    }

    pub fn admits(&self, location: &Location) -> bool {
        match self {
            LocationFilter::Any => true,
            LocationFilter::Warehouses(set) => {
                set.is_empty() || set.contains(&location.warehouse_id)
            }
            LocationFilter::Locations(set) => set.is_empty() || set.contains(&location.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(code: &str, warehouse: WarehouseId) -> Location {
        Location::new(LocationId::new(), code, warehouse).unwrap()
    }

    #[test]
    fn blank_code_is_rejected() {
        let err = Location::new(LocationId::new(), "  ", WarehouseId::new()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn locked_location_refuses_stock() {
        let l = loc("A-01", WarehouseId::new()).locked();
        assert_eq!(
            l.ensure_accepts_stock(),
            Err(DomainError::LocationLocked("A-01".to_string()))
        );
    }

    #[test]
    fn empty_filters_are_unrestricted() {
        let l = loc("A-01", WarehouseId::new());
        assert!(LocationFilter::Any.admits(&l));
        assert!(LocationFilter::warehouses([]).admits(&l));
        assert!(LocationFilter::locations([]).is_unrestricted());
    }

    #[test]
    fn warehouse_filter_excludes_other_warehouses() {
        let wh = WarehouseId::new();
        let inside = loc("A-01", wh);
        let outside = loc("B-01", WarehouseId::new());
        let filter = LocationFilter::warehouses([wh]);
        assert!(filter.admits(&inside));
        assert!(!filter.admits(&outside));
    }
}
