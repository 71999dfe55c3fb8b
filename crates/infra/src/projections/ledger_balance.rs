use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use wms_core::{ItemId, LocationId};
use wms_events::EventEnvelope;
use wms_inventory::{MovementNotification, MovementRecord, StockEvent};

use crate::store::{LedgerWriter, StoreError};

/// On-hand per item and location, derived from the ledger only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationBalance {
    pub item_id: ItemId,
    pub location_id: LocationId,
    pub on_hand: i64,
}

#[derive(Debug, Error)]
pub enum LedgerProjectionError {
    #[error("failed to deserialize stock event: {0}")]
    Deserialize(String),

    #[error("ledger sequence must be positive")]
    InvalidSequence,

    #[error("state lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default)]
struct BalanceState {
    balances: HashMap<(ItemId, LocationId), i64>,
    applied: BTreeSet<u64>,
}

/// Ledger balance projection.
///
/// Consumes published movement notifications (or replays the ledger) and
/// keeps a disposable per-location balance. Idempotent on the ledger
/// sequence, so redelivered or out-of-order envelopes are safe.
#[derive(Debug, Default)]
pub struct LedgerBalanceProjection {
    state: RwLock<BalanceState>,
}

impl LedgerBalanceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_hand(&self, item: ItemId, location: LocationId) -> i64 {
        self.state
            .read()
            .ok()
            .and_then(|s| s.balances.get(&(item, location)).copied())
            .unwrap_or(0)
    }

    pub fn item_total(&self, item: ItemId) -> i64 {
        self.state
            .read()
            .map(|s| {
                s.balances
                    .iter()
                    .filter(|((i, _), _)| *i == item)
                    .map(|(_, q)| *q)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Balances of `item`, sorted by location id.
    pub fn balances(&self, item: ItemId) -> Vec<LocationBalance> {
        let Ok(state) = self.state.read() else {
            return vec![];
        };
        let mut out: Vec<LocationBalance> = state
            .balances
            .iter()
            .filter(|((i, _), _)| *i == item)
            .map(|((item_id, location_id), on_hand)| LocationBalance {
                item_id: *item_id,
                location_id: *location_id,
                on_hand: *on_hand,
            })
            .collect();
        out.sort_by_key(|b| b.location_id);
        out
    }

    pub fn applied_count(&self) -> usize {
        self.state.read().map(|s| s.applied.len()).unwrap_or(0)
    }

    /// Apply a published envelope. Non-movement events are ignored.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), LedgerProjectionError> {
        let event: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| LedgerProjectionError::Deserialize(e.to_string()))?;
        match event {
            StockEvent::MovementRecorded(n) => self.apply_notification(&n),
            StockEvent::ContainerReceived(_) | StockEvent::ContainerClosed(_) => Ok(()),
        }
    }

    pub fn apply_notification(
        &self,
        n: &MovementNotification,
    ) -> Result<(), LedgerProjectionError> {
        self.apply(n.ledger_sequence, n.item_id, n.from_location, n.to_location, n.quantity)
    }

    pub fn apply_movement(&self, m: &MovementRecord) -> Result<(), LedgerProjectionError> {
        self.apply(m.sequence, m.item_id, m.from_location, m.to_location, m.quantity)
    }

    /// Clear and rebuild from the committed ledger, page by page.
    pub async fn rebuild<L>(
        &self,
        ledger: &L,
        page_size: usize,
    ) -> Result<usize, LedgerProjectionError>
    where
        L: LedgerWriter + ?Sized,
    {
        {
            let mut state = self.state.write().map_err(|_| LedgerProjectionError::Poisoned)?;
            *state = BalanceState::default();
        }

        let mut after = 0;
        let mut replayed = 0;
        loop {
            let page = ledger.movements_after(after, page_size.max(1)).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.sequence;
            for m in &page {
                self.apply_movement(m)?;
            }
            replayed += page.len();
        }
        Ok(replayed)
    }

    fn apply(
        &self,
        sequence: u64,
        item: ItemId,
        from: Option<LocationId>,
        to: Option<LocationId>,
        quantity: i64,
    ) -> Result<(), LedgerProjectionError> {
        if sequence == 0 {
            return Err(LedgerProjectionError::InvalidSequence);
        }
        let mut state = self.state.write().map_err(|_| LedgerProjectionError::Poisoned)?;
        if !state.applied.insert(sequence) {
            // Duplicate delivery.
            return Ok(());
        }

        if let Some(from) = from {
            adjust(&mut state.balances, (item, from), -quantity);
        }
        if let Some(to) = to {
            adjust(&mut state.balances, (item, to), quantity);
        }
        Ok(())
    }
}

fn adjust(
    balances: &mut HashMap<(ItemId, LocationId), i64>,
    key: (ItemId, LocationId),
    delta: i64,
) {
    let entry = balances.entry(key).or_insert(0);
    *entry += delta;
    if *entry == 0 {
        balances.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wms_core::MovementId;
    use wms_inventory::NewMovement;

    fn record(seq: u64, m: NewMovement) -> MovementRecord {
        MovementRecord::from_new(MovementId::new(), seq, m)
    }

    #[test]
    fn movements_shift_balances_between_locations() {
        let p = LedgerBalanceProjection::new();
        let item = ItemId::new();
        let a = LocationId::new();
        let b = LocationId::new();

        let now = Utc::now();
        for m in [
            record(1, NewMovement::receive(item, a, 10, now, "u", "")),
            record(2, NewMovement::transfer(item, a, b, 4, now, "u", "")),
            record(3, NewMovement::issue(item, b, 1, now, "u", "")),
        ] {
            p.apply_movement(&m).unwrap();
        }

        assert_eq!(p.on_hand(item, a), 6);
        assert_eq!(p.on_hand(item, b), 3);
        assert_eq!(p.item_total(item), 9);
        assert_eq!(p.balances(item).len(), 2);
    }

    #[test]
    fn redelivery_is_ignored() {
        let p = LedgerBalanceProjection::new();
        let item = ItemId::new();
        let a = LocationId::new();
        let m = record(7, NewMovement::receive(item, a, 5, Utc::now(), "u", ""));
        p.apply_movement(&m).unwrap();
        p.apply_movement(&m).unwrap();
        assert_eq!(p.on_hand(item, a), 5);
        assert_eq!(p.applied_count(), 1);
    }

    #[test]
    fn out_of_order_delivery_converges() {
        let p = LedgerBalanceProjection::new();
        let item = ItemId::new();
        let a = LocationId::new();
        let now = Utc::now();
        p.apply_movement(&record(2, NewMovement::issue(item, a, 3, now, "u", "")))
            .unwrap();
        p.apply_movement(&record(1, NewMovement::receive(item, a, 3, now, "u", "")))
            .unwrap();
        assert_eq!(p.on_hand(item, a), 0);
        assert!(p.balances(item).is_empty());
    }

    #[test]
    fn zero_sequence_is_rejected() {
        let p = LedgerBalanceProjection::new();
        let m = record(
            0,
            NewMovement::receive(ItemId::new(), LocationId::new(), 1, Utc::now(), "u", ""),
        );
        assert!(matches!(p.apply_movement(&m), Err(LedgerProjectionError::InvalidSequence)));
    }
}
