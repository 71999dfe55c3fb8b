use thiserror::Error;

use wms_core::{DomainError, ItemId};

use crate::store::StoreError;

/// Failure of an orchestrated stock operation. Any failure means every write
/// in the operation's scope was rolled back.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("location {0} is locked")]
    LocationLocked(String),

    #[error("insufficient stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: i64, available: i64 },

    /// Stock moved under a plan or a pinned version. Retry with a fresh plan.
    #[error("stock changed concurrently: {0}")]
    ConcurrentStockChanged(String),

    #[error("no stock available for item {0}")]
    NoStockAvailable(ItemId),

    #[error("container {0} is already closed")]
    ContainerAlreadyClosed(String),

    #[error("operation timed out: {0}")]
    OperationTimedOut(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation cancelled before it started")]
    Cancelled,

    #[error("storage failure: {0}")]
    Storage(String),
}

impl OperationError {
    /// Whether running the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperationError::OperationTimedOut(_) | OperationError::ConcurrentStockChanged(_)
        )
    }
}

impl From<DomainError> for OperationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => OperationError::Validation(msg),
            DomainError::InvariantViolation(msg) => OperationError::Validation(msg),
            DomainError::InvalidId(msg) => OperationError::Validation(msg),
            DomainError::NotFound => OperationError::RecordNotFound("record".to_string()),
            DomainError::Conflict(msg) => OperationError::ConcurrentStockChanged(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => OperationError::InsufficientStock {
                requested,
                available,
            },
            DomainError::LocationLocked(code) => OperationError::LocationLocked(code),
            DomainError::ContainerAlreadyClosed(code) => {
                OperationError::ContainerAlreadyClosed(code)
            }
        }
    }
}

impl From<StoreError> for OperationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Timeout(msg) => OperationError::OperationTimedOut(msg),
            StoreError::NotFound(what) => OperationError::RecordNotFound(what),
            StoreError::Conflict(msg) => OperationError::ConcurrentStockChanged(msg),
            StoreError::Domain(e) => e.into(),
            StoreError::Backend(msg) => OperationError::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(OperationError::OperationTimedOut("t".into()).is_retryable());
        assert!(OperationError::ConcurrentStockChanged("c".into()).is_retryable());
        assert!(!OperationError::LocationLocked("A".into()).is_retryable());
        assert!(!OperationError::NoStockAvailable(ItemId::new()).is_retryable());
    }

    #[test]
    fn store_errors_keep_their_domain_kind() {
        let e: OperationError = StoreError::Domain(DomainError::insufficient(5, 2)).into();
        assert!(matches!(
            e,
            OperationError::InsufficientStock {
                requested: 5,
                available: 2
            }
        ));
        let e: OperationError = StoreError::Timeout("gate".into()).into();
        assert!(matches!(e, OperationError::OperationTimedOut(_)));
        let e: OperationError = StoreError::Conflict("version".into()).into();
        assert!(e.is_retryable());
    }
}
