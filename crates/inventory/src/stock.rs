use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, Entity, ItemId, LocationId, StockRecordId};

use crate::location::Location;

/// Identity of a stock bucket: one item at one location, optionally per lot
/// and serial. At most one `StockRecord` exists per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub lot: Option<String>,
    pub serial: Option<String>,
}

impl StockKey {
    pub fn new(item_id: ItemId, location_id: LocationId) -> Self {
        Self {
            item_id,
            location_id,
            lot: None,
            serial: None,
        }
    }

    pub fn with_lot(mut self, lot: impl Into<String>) -> Self {
        self.lot = Some(lot.into());
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Same item/lot/serial at another location.
    pub fn at(&self, location_id: LocationId) -> Self {
        Self {
            location_id,
            ..self.clone()
        }
    }
}

/// Quantity of one item sitting at one location.
///
/// Invariants: `0 <= allocated <= on_hand`, so `available() >= 0`. A record
/// whose on-hand reaches zero is deleted by the repository, never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    id: StockRecordId,
    key: StockKey,
    on_hand: i64,
    allocated: i64,
    expiry: Option<NaiveDate>,
    received_at: DateTime<Utc>,
    version: u64,
}

impl StockRecord {
    /// First arrival of stock at a key.
    pub fn new(
        id: StockRecordId,
        key: StockKey,
        quantity: i64,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_positive(quantity)?;
        Ok(Self {
            id,
            key,
            on_hand: quantity,
            allocated: 0,
            expiry,
            received_at,
            version: 1,
        })
    }

    /// Rebuild a record from persisted columns, re-checking the invariants.
    pub fn restore(
        id: StockRecordId,
        key: StockKey,
        on_hand: i64,
        allocated: i64,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
        version: u64,
    ) -> DomainResult<Self> {
        if on_hand <= 0 {
            return Err(DomainError::invariant("persisted stock record has no quantity"));
        }
        if allocated < 0 || allocated > on_hand {
            return Err(DomainError::invariant(
                "allocated quantity must be within 0..=on_hand",
            ));
        }
        Ok(Self {
            id,
            key,
            on_hand,
            allocated,
            expiry,
            received_at,
            version,
        })
    }

    pub fn id_typed(&self) -> StockRecordId {
        self.id
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn item_id(&self) -> ItemId {
        self.key.item_id
    }

    pub fn location_id(&self) -> LocationId {
        self.key.location_id
    }

    pub fn lot(&self) -> Option<&str> {
        self.key.lot.as_deref()
    }

    pub fn serial(&self) -> Option<&str> {
        self.key.serial.as_deref()
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn allocated(&self) -> i64 {
        self.allocated
    }

    pub fn available(&self) -> i64 {
        self.on_hand - self.allocated
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        self.expiry
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_depleted(&self) -> bool {
        self.on_hand == 0
    }

    pub fn add(&mut self, quantity: i64) -> DomainResult<()> {
        ensure_positive(quantity)?;
        self.on_hand = self
            .on_hand
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("on-hand quantity overflow"))?;
        self.version += 1;
        Ok(())
    }

    /// Take quantity off the shelf.
    ///
    /// Fails with `InsufficientStock` when `quantity` exceeds on-hand, and
    /// refuses to dip into quantity that is allocated to someone else.
    pub fn remove(&mut self, quantity: i64) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if quantity > self.on_hand {
            return Err(DomainError::insufficient(quantity, self.on_hand));
        }
        if self.on_hand - quantity < self.allocated {
            return Err(DomainError::insufficient(quantity, self.available()));
        }
        self.on_hand -= quantity;
        self.version += 1;
        Ok(())
    }

    /// Overwrite on-hand with a physically counted quantity.
    ///
    /// Returns the signed difference (counted − previous). Zero is allowed and
    /// leaves the record depleted for the repository to delete.
    pub fn recount(&mut self, counted: i64) -> DomainResult<i64> {
        if counted < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        if counted < self.allocated {
            return Err(DomainError::invariant(
                "counted quantity is below the allocated quantity",
            ));
        }
        let delta = counted - self.on_hand;
        if delta == 0 {
            return Err(DomainError::validation("count matches on-hand quantity"));
        }
        self.on_hand = counted;
        self.version += 1;
        Ok(delta)
    }
}

impl Entity for StockRecord {
    type Id = StockRecordId;

    fn id(&self) -> StockRecordId {
        self.id
    }
}

/// A stock record joined with the location it sits in.
///
/// This is what allocation reads: the location supplies the code used as the
/// final tie-break and the warehouse used by filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub record: StockRecord,
    pub location: Location,
}

fn ensure_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(qty: i64) -> StockRecord {
        StockRecord::new(
            StockRecordId::new(),
            StockKey::new(ItemId::new(), LocationId::new()),
            qty,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn reserved(on_hand: i64, allocated: i64) -> StockRecord {
        let key = StockKey::new(ItemId::new(), LocationId::new());
        StockRecord::restore(StockRecordId::new(), key, on_hand, allocated, None, Utc::now(), 1)
            .unwrap()
    }

    #[test]
    fn new_record_rejects_non_positive_quantity() {
        let key = StockKey::new(ItemId::new(), LocationId::new());
        let err = StockRecord::new(StockRecordId::new(), key, 0, None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn remove_more_than_on_hand_is_insufficient() {
        let mut r = record(5);
        assert_eq!(r.remove(6), Err(DomainError::insufficient(6, 5)));
        assert_eq!(r.on_hand(), 5);
        assert_eq!(r.version(), 1);
    }

    #[test]
    fn remove_cannot_dip_into_allocated_quantity() {
        let mut r = reserved(10, 4);
        assert_eq!(r.available(), 6);
        assert_eq!(r.remove(7), Err(DomainError::insufficient(7, 6)));
        r.remove(6).unwrap();
        assert_eq!(r.on_hand(), 4);
        assert_eq!(r.available(), 0);
    }

    #[test]
    fn every_mutation_bumps_version() {
        let mut r = record(10);
        r.add(2).unwrap();
        r.remove(3).unwrap();
        r.recount(4).unwrap();
        assert_eq!(r.version(), 4);
        assert_eq!(r.on_hand(), 4);
    }

    #[test]
    fn recount_reports_signed_delta() {
        let mut r = record(10);
        assert_eq!(r.recount(7), Ok(-3));
        assert_eq!(r.recount(12), Ok(5));
        assert!(matches!(r.recount(12), Err(DomainError::Validation(_))));
        let mut held = reserved(10, 2);
        assert!(matches!(held.recount(1), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn restore_rejects_broken_rows() {
        let key = StockKey::new(ItemId::new(), LocationId::new());
        let id = StockRecordId::new();
        assert!(StockRecord::restore(id, key.clone(), 0, 0, None, Utc::now(), 1).is_err());
        assert!(StockRecord::restore(id, key.clone(), 3, 4, None, Utc::now(), 1).is_err());
        assert!(StockRecord::restore(id, key, 3, 3, None, Utc::now(), 7).is_ok());
    }

    #[test]
    fn key_at_keeps_lot_and_serial() {
        let key = StockKey::new(ItemId::new(), LocationId::new())
            .with_lot("L-1")
            .with_serial("S-9");
        let dest = LocationId::new();
        let moved = key.at(dest);
        assert_eq!(moved.location_id, dest);
        assert_eq!(moved.lot.as_deref(), Some("L-1"));
        assert_eq!(moved.serial.as_deref(), Some("S-9"));
        assert_eq!(moved.item_id, key.item_id);
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// On-hand always equals everything added minus every removal that
        /// succeeded, and never goes negative.
        #[test]
        fn add_remove_conserves_quantity(
            initial in 1i64..50,
            ops in prop::collection::vec((any::<bool>(), 1i64..30), 0..40),
        ) {
            let mut r = record(initial);
            let mut expected = initial;
            for (is_add, qty) in ops {
                if is_add {
                    r.add(qty).unwrap();
                    expected += qty;
                } else if r.remove(qty).is_ok() {
                    expected -= qty;
                }
                prop_assert!(r.on_hand() >= 0);
                prop_assert_eq!(r.on_hand(), expected);
                prop_assert_eq!(r.available(), r.on_hand() - r.allocated());
            }
        }
    }
}
