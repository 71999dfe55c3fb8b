//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// quantity invariants, lifecycle rules). Storage and timeout concerns belong
/// to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A quantity exceeds what the record can give up.
    #[error("insufficient stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: i64, available: i64 },

    /// The location refuses inbound stock.
    #[error("location {0} is locked")]
    LocationLocked(String),

    /// The container already reached its terminal state.
    #[error("container {0} is already closed")]
    ContainerAlreadyClosed(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }
}
