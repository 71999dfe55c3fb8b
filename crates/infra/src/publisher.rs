//! Post-commit event publication.
//!
//! Publication runs after the scope committed and is best-effort: a failure
//! is logged and counted, never propagated to the caller of the mutation.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use wms_events::{Event, EventBus, EventEnvelope};
use wms_inventory::StockEvent;

/// Stream name carried by every stock envelope.
pub const STOCK_STREAM: &str = "stock.ledger";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event serialization failed: {0}")]
    Serialize(String),

    #[error("event bus rejected publish: {0}")]
    Bus(String),
}

/// Wraps a bus with the stock stream's envelope sequence.
#[derive(Debug)]
pub struct EventPublisher<B> {
    bus: B,
    sequence: AtomicU64,
    failures: AtomicU64,
}

impl<B> EventPublisher<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            sequence: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Number of publications that failed since start.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn publish(
        &self,
        event: &StockEvent,
        published_at: DateTime<Utc>,
    ) -> Result<(), PublishError> {
        let payload =
            serde_json::to_value(event).map_err(|e| PublishError::Serialize(e.to_string()))?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            STOCK_STREAM,
            sequence,
            event.event_type(),
            published_at,
            payload,
        );
        self.bus
            .publish(envelope)
            .map_err(|e| PublishError::Bus(format!("{e:?}")))
    }

    /// Publish every event, logging failures. Returns how many went out.
    pub fn publish_all(&self, events: &[StockEvent], published_at: DateTime<Utc>) -> usize {
        let mut delivered = 0;
        for event in events {
            match self.publish(event, published_at) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_type = event.event_type(),
                        %error,
                        "stock event publication failed"
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use wms_core::{ItemId, LocationId, MovementId};
    use wms_events::{InMemoryBusError, InMemoryEventBus, Subscription};
    use wms_inventory::{MovementNotification, MovementRecord, NewMovement};

    fn movement_event() -> StockEvent {
        let rec = MovementRecord::from_new(
            MovementId::new(),
            1,
            NewMovement::receive(ItemId::new(), LocationId::new(), 3, Utc::now(), "u", "PO-1"),
        );
        StockEvent::MovementRecorded(MovementNotification::from(&rec))
    }

    #[test]
    fn envelopes_carry_increasing_sequence_and_type() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> =
            Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let publisher = EventPublisher::new(bus);

        let events = vec![movement_event(), movement_event()];
        assert_eq!(publisher.publish_all(&events, Utc::now()), 2);

        let got = sub.drain();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].sequence_number(), 1);
        assert_eq!(got[1].sequence_number(), 2);
        assert_eq!(got[0].stream(), STOCK_STREAM);
        assert_eq!(got[0].event_type(), "stock.movement.recorded");
    }

    struct BrokenBus;

    impl EventBus<EventEnvelope<JsonValue>> for BrokenBus {
        type Error = InMemoryBusError;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            Err(InMemoryBusError::Poisoned)
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            let (_tx, rx) = std::sync::mpsc::channel();
            Subscription::new(rx)
        }
    }

    #[test]
    fn failures_are_counted_not_raised() {
        let publisher = EventPublisher::new(BrokenBus);
        assert_eq!(publisher.publish_all(&[movement_event()], Utc::now()), 0);
        assert_eq!(publisher.failures(), 1);
    }
}
