//! Tracing and logging setup shared by binaries and tests.

/// Initialize process-wide tracing from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, init_for_tests, init_with};
