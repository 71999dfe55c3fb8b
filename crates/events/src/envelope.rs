use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope for a published event.
///
/// Notes:
/// - `stream` names the publisher's logical stream (e.g. "stock.ledger").
/// - `sequence_number` is monotonically increasing per publisher; consumers use
///   it to drop duplicates under at-least-once delivery.
/// - `payload` is the event itself (typed, or JSON for transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    stream: String,

    /// Monotonically increasing position in the publisher's stream.
    sequence_number: u64,

    event_type: String,
    published_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        stream: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        published_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            stream: stream.into(),
            sequence_number,
            event_type: event_type.into(),
            published_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Re-wrap the payload (e.g. typed event to JSON) keeping the metadata.
    pub fn map_payload<F, T>(self, f: F) -> EventEnvelope<T>
    where
        F: FnOnce(E) -> T,
    {
        EventEnvelope {
            event_id: self.event_id,
            stream: self.stream,
            sequence_number: self.sequence_number,
            event_type: self.event_type,
            published_at: self.published_at,
            payload: f(self.payload),
        }
    }
}
