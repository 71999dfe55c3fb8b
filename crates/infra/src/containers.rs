//! Container (LPN) lifecycle: code allocation, opening at receipt, closing
//! at putaway. Stock movement for the lines is the orchestrator's job; this
//! manager only owns the container rows.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tracing::debug;

use wms_core::{ContainerId, LocationId};
use wms_inventory::{Container, ContainerCode, ContainerLine};

use crate::store::{ContainerRepository, StoreError};

/// Container code source.
///
/// The disambiguator is the creation time in milliseconds, bumped so it is
/// strictly increasing even when two containers share a millisecond (or the
/// clock steps back).
#[derive(Debug, Default)]
pub struct ContainerCodeGenerator {
    last: AtomicU64,
}

/// Shared by every `ContainerManager` in the process.
static CONTAINER_CODES: ContainerCodeGenerator = ContainerCodeGenerator::new();

impl ContainerCodeGenerator {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self, now: DateTime<Utc>) -> ContainerCode {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(last.saturating_add(1).max(millis))
            })
            .unwrap_or_else(|last| last);
        ContainerCode::compose(now.date_naive(), previous.saturating_add(1).max(millis))
    }
}

#[derive(Debug)]
pub struct ContainerManager<S> {
    store: Arc<S>,
    codes: &'static ContainerCodeGenerator,
}

impl<S> ContainerManager<S>
where
    S: ContainerRepository,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            codes: &CONTAINER_CODES,
        }
    }

    /// Open a container with a fresh code and insert it in `scope`.
    pub async fn open_in(
        &self,
        scope: &mut S::Scope,
        location: LocationId,
        lines: Vec<ContainerLine>,
        note: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Container, StoreError> {
        let container = Container::open(
            ContainerId::new(),
            self.codes.next(now),
            location,
            lines,
            note,
            now,
        )?;
        self.store.insert_container(scope, &container).await?;
        debug!(code = %container.code(), "container opened");
        Ok(container)
    }

    /// Load a container for putaway; fails with `ContainerAlreadyClosed`
    /// when it is already closed.
    pub async fn load_open(
        &self,
        scope: &mut S::Scope,
        id: ContainerId,
    ) -> Result<Container, StoreError> {
        let container = self.store.container_for_update(scope, id).await?;
        container.ensure_open()?;
        Ok(container)
    }

    pub async fn close_in(
        &self,
        scope: &mut S::Scope,
        container: &mut Container,
        destination: LocationId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        container.close_at(destination, at)?;
        self.store.save_container(scope, container).await
    }

    pub async fn get(&self, id: ContainerId) -> Result<Option<Container>, StoreError> {
        self.store.container(id).await
    }

    pub async fn by_code(&self, code: &ContainerCode) -> Result<Option<Container>, StoreError> {
        self.store.container_by_code(code).await
    }

    pub async fn open_containers(&self) -> Result<Vec<Container>, StoreError> {
        self.store.open_containers().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wms_core::{ItemId, WarehouseId};
    use wms_inventory::Location;

    use crate::store::{InMemoryStockStore, StockRepository, StockStore};

    #[test]
    fn codes_are_unique_within_one_millisecond() {
        let codes = ContainerCodeGenerator::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let a = codes.next(now);
        let b = codes.next(now);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("LPN-20240105-"));
        assert_eq!(a.as_str(), format!("LPN-20240105-{}", now.timestamp_millis()));
        assert_eq!(b.as_str(), format!("LPN-20240105-{}", now.timestamp_millis() + 1));
    }

    #[test]
    fn codes_keep_increasing_when_clock_steps_back() {
        let codes = ContainerCodeGenerator::new();
        let later = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 1, 5, 11, 0, 0).unwrap();
        let first = codes.next(later);
        let second = codes.next(earlier);
        let n = |c: &ContainerCode| -> u64 {
            c.as_str().rsplit('-').next().unwrap().parse().unwrap()
        };
        assert!(n(&second) > n(&first));
    }

    #[tokio::test]
    async fn managers_share_one_code_sequence() {
        let store = Arc::new(InMemoryStockStore::new());
        let dock = Location::new(LocationId::new(), "DOCK", WarehouseId::new()).unwrap();
        store.save_location(&dock).await.unwrap();
        let first = ContainerManager::new(Arc::clone(&store));
        let second = ContainerManager::new(Arc::clone(&store));
        let now = Utc.with_ymd_and_hms(2024, 2, 9, 10, 0, 0).unwrap();
        let lines = vec![ContainerLine::new(ItemId::new(), 1)];

        let mut scope = store.begin(std::time::Duration::from_secs(1)).await.unwrap();
        let a = first
            .open_in(&mut scope, dock.id, lines.clone(), "", now)
            .await
            .unwrap();
        let b = second
            .open_in(&mut scope, dock.id, lines, "", now)
            .await
            .unwrap();
        store.commit(scope).await.unwrap();

        assert_ne!(a.code(), b.code());
        assert_eq!(store.open_containers().await.unwrap().len(), 2);
    }
}
