use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, ItemId, LocationId, MovementId};

/// Kind of stock change recorded in the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Receive,
    Issue,
    Move,
    CountAdjust,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Receive => "receive",
            MovementType::Issue => "issue",
            MovementType::Move => "move",
            MovementType::CountAdjust => "count_adjust",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "receive" => Ok(MovementType::Receive),
            "issue" => Ok(MovementType::Issue),
            "move" => Ok(MovementType::Move),
            "count_adjust" => Ok(MovementType::CountAdjust),
            other => Err(DomainError::validation(format!("unknown movement type '{other}'"))),
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger entry that has not been appended yet (no id, no sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub kind: MovementType,
    pub item_id: ItemId,
    pub from_location: Option<LocationId>,
    pub to_location: Option<LocationId>,
    pub quantity: i64,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub actor: String,
    pub reference: String,
    pub note: String,
}

impl NewMovement {
    fn base(
        kind: MovementType,
        item_id: ItemId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            item_id,
            from_location: None,
            to_location: None,
            quantity,
            lot: None,
            serial: None,
            occurred_at,
            actor: actor.into(),
            reference: reference.into(),
            note: String::new(),
        }
    }

    pub fn receive(
        item_id: ItemId,
        to: LocationId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        let mut m = Self::base(
            MovementType::Receive,
            item_id,
            quantity,
            occurred_at,
            actor,
            reference,
        );
        m.to_location = Some(to);
        m
    }

    pub fn issue(
        item_id: ItemId,
        from: LocationId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        let mut m = Self::base(
            MovementType::Issue,
            item_id,
            quantity,
            occurred_at,
            actor,
            reference,
        );
        m.from_location = Some(from);
        m
    }

    pub fn transfer(
        item_id: ItemId,
        from: LocationId,
        to: LocationId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        let mut m = Self::base(
            MovementType::Move,
            item_id,
            quantity,
            occurred_at,
            actor,
            reference,
        );
        m.from_location = Some(from);
        m.to_location = Some(to);
        m
    }

    /// Count adjustment at `location`; a positive delta is a gain.
    pub fn count_adjust(
        item_id: ItemId,
        location: LocationId,
        delta: i64,
        occurred_at: DateTime<Utc>,
        actor: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        let mut m = Self::base(
            MovementType::CountAdjust,
            item_id,
            delta.abs(),
            occurred_at,
            actor,
            reference,
        );
        if delta >= 0 {
            m.to_location = Some(location);
        } else {
            m.from_location = Some(location);
        }
        m
    }

    pub fn with_lot_serial(mut self, lot: Option<String>, serial: Option<String>) -> Self {
        self.lot = lot;
        self.serial = serial;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Checks quantity and that the locations fit the movement type.
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("movement quantity must be positive"));
        }
        if self.actor.trim().is_empty() {
            return Err(DomainError::validation("movement actor cannot be empty"));
        }
        let ok = match self.kind {
            MovementType::Receive => self.from_location.is_none() && self.to_location.is_some(),
            MovementType::Issue => self.from_location.is_some() && self.to_location.is_none(),
            MovementType::Move => match (self.from_location, self.to_location) {
                (Some(from), Some(to)) => from != to,
                _ => false,
            },
            MovementType::CountAdjust => self.from_location.is_some() != self.to_location.is_some(),
        };
        if !ok {
            return Err(DomainError::validation(format!(
                "locations do not fit a {} movement",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Immutable ledger entry. Created once per committed change, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    /// Position in the ledger (monotonic, starts at 1).
    pub sequence: u64,
    pub kind: MovementType,
    pub item_id: ItemId,
    pub from_location: Option<LocationId>,
    pub to_location: Option<LocationId>,
    pub quantity: i64,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub actor: String,
    pub reference: String,
    pub note: String,
}

impl MovementRecord {
    pub fn from_new(id: MovementId, sequence: u64, m: NewMovement) -> Self {
        Self {
            id,
            sequence,
            kind: m.kind,
            item_id: m.item_id,
            from_location: m.from_location,
            to_location: m.to_location,
            quantity: m.quantity,
            lot: m.lot,
            serial: m.serial,
            occurred_at: m.occurred_at,
            actor: m.actor,
            reference: m.reference,
            note: m.note,
        }
    }

    /// Signed on-hand change this entry caused at `location`.
    pub fn effect_at(&self, location: LocationId) -> i64 {
        let mut delta = 0;
        if self.to_location == Some(location) {
            delta += self.quantity;
        }
        if self.from_location == Some(location) {
            delta -= self.quantity;
        }
        delta
    }

    /// Signed change to the item's total on-hand across all locations.
    pub fn net_effect(&self) -> i64 {
        match (self.from_location, self.to_location) {
            (Some(_), Some(_)) => 0,
            (None, Some(_)) => self.quantity,
            (Some(_), None) => -self.quantity,
            (None, None) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_produce_valid_shapes() {
        let item = ItemId::new();
        let a = LocationId::new();
        let b = LocationId::new();
        let now = Utc::now();

        assert!(NewMovement::receive(item, a, 3, now, "u", "PO-1").validate().is_ok());
        assert!(NewMovement::issue(item, a, 3, now, "u", "REQ-1").validate().is_ok());
        assert!(NewMovement::transfer(item, a, b, 3, now, "u", "MV").validate().is_ok());
        assert!(NewMovement::count_adjust(item, a, -2, now, "u", "CC").validate().is_ok());
    }

    #[test]
    fn move_onto_same_location_is_invalid() {
        let a = LocationId::new();
        let m = NewMovement::transfer(ItemId::new(), a, a, 1, Utc::now(), "u", "");
        assert!(matches!(m.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let m = NewMovement::receive(ItemId::new(), LocationId::new(), 0, Utc::now(), "u", "");
        assert!(m.validate().is_err());
    }

    #[test]
    fn count_adjust_direction_follows_sign() {
        let loc = LocationId::new();
        let gain = NewMovement::count_adjust(ItemId::new(), loc, 4, Utc::now(), "u", "");
        assert_eq!((gain.from_location, gain.to_location, gain.quantity), (None, Some(loc), 4));
        let loss = NewMovement::count_adjust(ItemId::new(), loc, -4, Utc::now(), "u", "");
        assert_eq!((loss.from_location, loss.to_location, loss.quantity), (Some(loc), None, 4));
    }

    #[test]
    fn effects_match_direction() {
        let item = ItemId::new();
        let a = LocationId::new();
        let b = LocationId::new();
        let rec = MovementRecord::from_new(
            MovementId::new(),
            1,
            NewMovement::transfer(item, a, b, 5, Utc::now(), "u", ""),
        );
        assert_eq!(rec.effect_at(a), -5);
        assert_eq!(rec.effect_at(b), 5);
        assert_eq!(rec.net_effect(), 0);
    }

    #[test]
    fn movement_type_string_round_trip() {
        for t in [
            MovementType::Receive,
            MovementType::Issue,
            MovementType::Move,
            MovementType::CountAdjust,
        ] {
            assert_eq!(MovementType::parse(t.as_str()), Ok(t));
        }
        assert!(MovementType::parse("teleport").is_err());
    }
}
