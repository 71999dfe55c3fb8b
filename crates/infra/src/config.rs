//! Runtime configuration, read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `WMS_SCOPE_TIMEOUT_MS` | `5000` |
//! | `WMS_EXPIRY_WARNING_DAYS` | `30` |
//! | `WMS_STALE_PLAN_POLICY` | `reject` (`reject` or `clamp`) |
//! | `DATABASE_URL` | unset |
//! | `USE_PERSISTENT_STORES` | `false` |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wms_inventory::AllocationPolicy;

/// A hundred years; anything wider is a typo.
const MAX_EXPIRY_WARNING_DAYS: i64 = 36_500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")]
    MissingDatabaseUrl,
}

/// What an issue does when a planned line lost stock between planning and
/// commit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePlanPolicy {
    /// Fail the whole issue with `ConcurrentStockChanged`.
    #[default]
    Reject,
    /// Issue what is still there and report a partial.
    Clamp,
}

impl StalePlanPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "clamp" => Some(Self::Clamp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound on waiting for a transactional scope.
    pub scope_timeout: Duration,
    pub allocation: AllocationPolicy,
    pub stale_plan_policy: StalePlanPolicy,
    pub database_url: Option<String>,
    pub use_persistent_stores: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            scope_timeout: Duration::from_millis(5_000),
            allocation: AllocationPolicy::default(),
            stale_plan_policy: StalePlanPolicy::default(),
            database_url: None,
            use_persistent_stores: false,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("WMS_SCOPE_TIMEOUT_MS") {
            let ms: u64 = parse_number("WMS_SCOPE_TIMEOUT_MS", &raw)?;
            if ms == 0 {
                return Err(invalid("WMS_SCOPE_TIMEOUT_MS", raw, "must be positive"));
            }
            config.scope_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("WMS_EXPIRY_WARNING_DAYS") {
            let days: i64 = parse_number("WMS_EXPIRY_WARNING_DAYS", &raw)?;
            if !(0..=MAX_EXPIRY_WARNING_DAYS).contains(&days) {
                return Err(invalid(
                    "WMS_EXPIRY_WARNING_DAYS",
                    raw,
                    format!("must be between 0 and {MAX_EXPIRY_WARNING_DAYS}"),
                ));
            }
            config.allocation.expiry_warning_days = days;
        }

        if let Some(raw) = lookup("WMS_STALE_PLAN_POLICY") {
            config.stale_plan_policy = StalePlanPolicy::parse(&raw)
                .ok_or_else(|| invalid("WMS_STALE_PLAN_POLICY", raw, "expected reject or clamp"))?;
        }

        config.database_url = lookup("DATABASE_URL").filter(|s| !s.trim().is_empty());

        config.use_persistent_stores = lookup("USE_PERSISTENT_STORES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if config.use_persistent_stores && config.database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(config)
    }
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| invalid(var, raw.to_string(), e.to_string()))
}

fn invalid(var: &'static str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.into(),
        reason: reason.into(),
    }
}
