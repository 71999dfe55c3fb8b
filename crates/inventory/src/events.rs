use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{ContainerId, ItemId, LocationId, MovementId};
use wms_events::Event;

use crate::container::{Container, ContainerCode};
use crate::movement::{MovementRecord, MovementType};

/// Published once per committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementNotification {
    pub movement_id: MovementId,
    /// Ledger sequence of the movement; consumers dedupe on it.
    pub ledger_sequence: u64,
    pub kind: MovementType,
    pub item_id: ItemId,
    pub from_location: Option<LocationId>,
    pub to_location: Option<LocationId>,
    pub quantity: i64,
    pub lot: Option<String>,
    pub serial: Option<String>,
    pub reference: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&MovementRecord> for MovementNotification {
    fn from(m: &MovementRecord) -> Self {
        Self {
            movement_id: m.id,
            ledger_sequence: m.sequence,
            kind: m.kind,
            item_id: m.item_id,
            from_location: m.from_location,
            to_location: m.to_location,
            quantity: m.quantity,
            lot: m.lot.clone(),
            serial: m.serial.clone(),
            reference: m.reference.clone(),
            actor: m.actor.clone(),
            occurred_at: m.occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReceived {
    pub container_id: ContainerId,
    pub code: ContainerCode,
    pub location_id: LocationId,
    pub line_count: usize,
    pub total_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

impl From<&Container> for ContainerReceived {
    fn from(c: &Container) -> Self {
        Self {
            container_id: c.id_typed(),
            code: c.code().clone(),
            location_id: c.location_id(),
            line_count: c.lines().len(),
            total_quantity: c.total_quantity(),
            occurred_at: c.created_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerClosed {
    pub container_id: ContainerId,
    pub code: ContainerCode,
    pub destination: LocationId,
    pub occurred_at: DateTime<Utc>,
}

/// Notifications about committed stock changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockEvent {
    MovementRecorded(MovementNotification),
    ContainerReceived(ContainerReceived),
    ContainerClosed(ContainerClosed),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::MovementRecorded(_) => "stock.movement.recorded",
            StockEvent::ContainerReceived(_) => "stock.container.received",
            StockEvent::ContainerClosed(_) => "stock.container.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::MovementRecorded(e) => e.occurred_at,
            StockEvent::ContainerReceived(e) => e.occurred_at,
            StockEvent::ContainerClosed(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::NewMovement;

    #[test]
    fn movement_notification_copies_ledger_entry() {
        let rec = MovementRecord::from_new(
            MovementId::new(),
            9,
            NewMovement::receive(ItemId::new(), LocationId::new(), 4, Utc::now(), "u", "PO-7"),
        );
        let ev = StockEvent::MovementRecorded(MovementNotification::from(&rec));
        assert_eq!(ev.event_type(), "stock.movement.recorded");
        assert_eq!(ev.occurred_at(), rec.occurred_at);
        match ev {
            StockEvent::MovementRecorded(n) => {
                assert_eq!(n.ledger_sequence, 9);
                assert_eq!(n.reference, "PO-7");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
