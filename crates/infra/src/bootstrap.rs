//! Wiring: pick a backend from configuration and build the orchestrator.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;
use tracing::info;

use wms_events::{EventEnvelope, InMemoryEventBus};

use crate::config::LedgerConfig;
use crate::orchestrator::TransactionOrchestrator;
use crate::store::{InMemoryStockStore, PostgresStockStore};

/// Bus type shared by the orchestrator and its subscribers.
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// An orchestrator over whichever backend the configuration selected.
pub enum LedgerRuntime {
    InMemory(TransactionOrchestrator<InMemoryStockStore, SharedBus>),
    Postgres(TransactionOrchestrator<PostgresStockStore, SharedBus>),
}

impl LedgerRuntime {
    /// Build from `USE_PERSISTENT_STORES` / `DATABASE_URL` and friends.
    pub async fn from_env(bus: SharedBus) -> anyhow::Result<Self> {
        let config = LedgerConfig::from_env().context("loading ledger configuration")?;
        Self::build(config, bus).await
    }

    pub async fn build(config: LedgerConfig, bus: SharedBus) -> anyhow::Result<Self> {
        if !config.use_persistent_stores {
            info!("using in-memory stock store");
            let store = Arc::new(InMemoryStockStore::new());
            return Ok(Self::InMemory(TransactionOrchestrator::new(store, bus, config)));
        }

        let url = config
            .database_url
            .clone()
            .context("DATABASE_URL is required for persistent stores")?;
        let store = PostgresStockStore::connect(&url)
            .await
            .context("connecting to postgres")?;
        store
            .ensure_schema()
            .await
            .context("applying stock ledger schema")?;
        info!("using postgres stock store");
        Ok(Self::Postgres(TransactionOrchestrator::new(
            Arc::new(store),
            bus,
            config,
        )))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            LedgerRuntime::InMemory(_) => "in-memory",
            LedgerRuntime::Postgres(_) => "postgres",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_select_the_in_memory_store() {
        let bus = Arc::new(InMemoryEventBus::new());
        let runtime = LedgerRuntime::build(LedgerConfig::default(), bus).await.unwrap();
        assert_eq!(runtime.backend_name(), "in-memory");
    }

    #[tokio::test]
    async fn persistent_store_without_url_is_an_error() {
        let config = LedgerConfig {
            use_persistent_stores: true,
            ..LedgerConfig::default()
        };
        let err = LedgerRuntime::build(config, Arc::new(InMemoryEventBus::new()))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
