//! Transactional storage boundary for stock, ledger and containers.
//!
//! Every mutation runs inside a caller-owned scope:
//!
//! ```text
//! begin(timeout) → find/upsert/decrement/append/... → commit | rollback
//! ```
//!
//! The stock repository, ledger writer and container repository share one
//! `Scope` type, so a single scope covers a stock change and the ledger entry
//! that records it. Dropping a scope without committing discards its writes.
//!
//! Reads that take no scope (`positions`, `history`, `container`, ...) see the
//! last committed state and never wait on writers.

pub mod in_memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use wms_core::{ContainerId, DomainError, ItemId, LocationId, StockRecordId};
use wms_inventory::{
    Container, ContainerCode, Location, LocationFilter, MovementRecord, NewMovement, StockKey,
    StockPosition, StockRecord,
};

pub use in_memory::{InMemoryScope, InMemoryStockStore};
pub use postgres::PostgresStockStore;

/// Storage failure.
///
/// Domain rule violations detected while mutating a record surface as
/// `Domain` so callers keep the precise kind (`InsufficientStock`, ...).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A scope or row lock could not be obtained in time.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic check failed, unique key collided, or the backend aborted
    /// a serialization conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Scope management shared by all repositories of a backend.
#[async_trait]
pub trait StockStore: Send + Sync {
    type Scope: Send;

    /// Open a scope, waiting at most `timeout` for it.
    async fn begin(&self, timeout: Duration) -> Result<Self::Scope, StoreError>;

    async fn commit(&self, scope: Self::Scope) -> Result<(), StoreError>;

    async fn rollback(&self, scope: Self::Scope) -> Result<(), StoreError>;
}

/// Stock records and the locations they sit in.
#[async_trait]
pub trait StockRepository: StockStore {
    /// Register or update a location (setup/admin path, outside scopes).
    async fn save_location(&self, location: &Location) -> Result<(), StoreError>;

    /// Location inside a scope; `NotFound` if unknown.
    async fn location(
        &self,
        scope: &mut Self::Scope,
        id: LocationId,
    ) -> Result<Location, StoreError>;

    async fn find(
        &self,
        scope: &mut Self::Scope,
        key: &StockKey,
    ) -> Result<Option<StockRecord>, StoreError>;

    /// Record by id, locked for the rest of the scope.
    async fn get(
        &self,
        scope: &mut Self::Scope,
        id: StockRecordId,
    ) -> Result<Option<StockRecord>, StoreError>;

    /// Add to the record at `key`, creating it when absent. An existing
    /// record keeps its own expiry and received timestamp.
    async fn upsert_add(
        &self,
        scope: &mut Self::Scope,
        key: &StockKey,
        quantity: i64,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
    ) -> Result<StockRecord, StoreError>;

    /// Reduce on-hand. Returns the remaining record, or `None` when it
    /// reached zero and was deleted.
    async fn decrement(
        &self,
        scope: &mut Self::Scope,
        id: StockRecordId,
        quantity: i64,
    ) -> Result<Option<StockRecord>, StoreError>;

    /// Overwrite on-hand with a counted quantity. Returns the signed delta
    /// and the record (`None` if the count was zero and it was deleted).
    async fn set_on_hand(
        &self,
        scope: &mut Self::Scope,
        id: StockRecordId,
        counted: i64,
    ) -> Result<(i64, Option<StockRecord>), StoreError>;

    /// Records of `item` with available > 0 admitted by `filter`, locked.
    async fn list_available(
        &self,
        scope: &mut Self::Scope,
        item: ItemId,
        filter: &LocationFilter,
    ) -> Result<Vec<StockPosition>, StoreError>;

    /// Committed snapshot of allocatable positions (no locking).
    async fn positions(
        &self,
        item: ItemId,
        filter: &LocationFilter,
    ) -> Result<Vec<StockPosition>, StoreError>;

    /// Committed on-hand across all locations of `item`.
    async fn on_hand_total(&self, item: ItemId) -> Result<i64, StoreError>;
}

/// Append-only movement ledger.
#[async_trait]
pub trait LedgerWriter: StockStore {
    /// Append one entry; the writer assigns id and sequence.
    async fn append(
        &self,
        scope: &mut Self::Scope,
        movement: NewMovement,
    ) -> Result<MovementRecord, StoreError>;

    /// Committed movements of `item`, in ledger order.
    async fn history(&self, item: ItemId) -> Result<Vec<MovementRecord>, StoreError>;

    /// Committed movements with sequence greater than `after`, up to `limit`.
    async fn movements_after(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<Vec<MovementRecord>, StoreError>;
}

#[async_trait]
pub trait ContainerRepository: StockStore {
    /// Insert a new container; a duplicate code is a `Conflict`.
    async fn insert_container(
        &self,
        scope: &mut Self::Scope,
        container: &Container,
    ) -> Result<(), StoreError>;

    /// Container locked for update.
    async fn container_for_update(
        &self,
        scope: &mut Self::Scope,
        id: ContainerId,
    ) -> Result<Container, StoreError>;

    async fn save_container(
        &self,
        scope: &mut Self::Scope,
        container: &Container,
    ) -> Result<(), StoreError>;

    async fn container(&self, id: ContainerId) -> Result<Option<Container>, StoreError>;

    async fn container_by_code(
        &self,
        code: &ContainerCode,
    ) -> Result<Option<Container>, StoreError>;

    async fn open_containers(&self) -> Result<Vec<Container>, StoreError>;
}

/// Everything the orchestrator needs from one backend.
pub trait LedgerStore: StockRepository + LedgerWriter + ContainerRepository {}

impl<T> LedgerStore for T where T: StockRepository + LedgerWriter + ContainerRepository {}
