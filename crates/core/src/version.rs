//! Optimistic concurrency expectations for versioned rows.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Optimistic concurrency expectation for a versioned record.
///
/// Stock records carry a `version` that is bumped on every in-place mutation.
/// Callers that showed a record to a user can pin the version they saw.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Skip version checking.
    #[default]
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_reports_conflict_on_mismatch() {
        assert!(ExpectedVersion::Exact(3).check(3).is_ok());
        assert!(matches!(
            ExpectedVersion::Exact(3).check(4),
            Err(DomainError::Conflict(_))
        ));
    }
}
