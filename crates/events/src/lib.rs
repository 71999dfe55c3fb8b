//! Notification events emitted after stock mutations commit.
//!
//! The ledger is the source of truth; events are fan-out copies for
//! notification and reporting collaborators.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{DEFAULT_SUBSCRIBER_CAPACITY, InMemoryBusError, InMemoryEventBus};
