//! Infrastructure layer: storage backends, the transaction orchestrator,
//! allocation service, container lifecycle, event publication and the
//! ledger balance projection.

pub mod allocation;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod containers;
pub mod orchestrator;
pub mod projections;
pub mod publisher;
pub mod store;

mod integration_tests;

pub use allocation::{AllocationEngine, Allocator};
pub use bootstrap::{LedgerRuntime, SharedBus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, LedgerConfig, StalePlanPolicy};
pub use orchestrator::{OperationError, TransactionOrchestrator};
pub use store::{InMemoryStockStore, LedgerStore, PostgresStockStore, StoreError};
