//! Projection implementations (read model builders).
//!
//! Projections consume published stock events and build query-optimized
//! read models. They are:
//! - **Rebuildable**: can be reconstructed from the movement ledger
//! - **Idempotent**: safe for at-least-once delivery

pub mod ledger_balance;

pub use ledger_balance::{LedgerBalanceProjection, LedgerProjectionError, LocationBalance};
