//! In-memory backend for tests/dev.
//!
//! Writers are serialized by a single async gate. A scope works on a private
//! copy of the committed state and swaps it in on commit, so readers always
//! see the last committed snapshot and never block on a writer. Not optimized
//! for large data sets: every scope copies the stock state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use wms_core::{ContainerId, ItemId, LocationId, MovementId, StockRecordId};
use wms_inventory::{
    Container, ContainerCode, Location, LocationFilter, MovementRecord, NewMovement, StockKey,
    StockPosition, StockRecord,
};

use super::{ContainerRepository, LedgerWriter, StockRepository, StockStore, StoreError};

#[derive(Debug, Clone, Default)]
struct StockState {
    locations: HashMap<LocationId, Location>,
    records: HashMap<StockRecordId, StockRecord>,
    by_key: HashMap<StockKey, StockRecordId>,
    containers: HashMap<ContainerId, Container>,
    container_codes: HashMap<ContainerCode, ContainerId>,
}

impl StockState {
    fn positions(&self, item: ItemId, filter: &LocationFilter) -> Vec<StockPosition> {
        self.records
            .values()
            .filter(|r| r.item_id() == item && r.available() > 0)
            .filter_map(|r| {
                let location = self.locations.get(&r.location_id())?;
                filter.admits(location).then(|| StockPosition {
                    record: r.clone(),
                    location: location.clone(),
                })
            })
            .collect()
    }

    fn record_mut(&mut self, id: StockRecordId) -> Result<&mut StockRecord, StoreError> {
        self.records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("stock record {id}")))
    }

    /// Delete the record if it reached zero; return what is left.
    fn settle(&mut self, id: StockRecordId) -> Option<StockRecord> {
        let depleted = self.records.get(&id).is_some_and(StockRecord::is_depleted);
        if depleted {
            if let Some(r) = self.records.remove(&id) {
                self.by_key.remove(r.key());
            }
            return None;
        }
        self.records.get(&id).cloned()
    }
}

#[derive(Debug, Default)]
struct Committed {
    state: Arc<StockState>,
    ledger: Vec<MovementRecord>,
}

/// In-memory stock, ledger and container store.
#[derive(Debug)]
pub struct InMemoryStockStore {
    committed: RwLock<Committed>,
    writer: Arc<Mutex<()>>,
}

/// Open write scope. Holds the writer gate until committed or dropped.
#[derive(Debug)]
pub struct InMemoryScope {
    _gate: OwnedMutexGuard<()>,
    state: StockState,
    pending: Vec<MovementRecord>,
    next_sequence: u64,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self {
            committed: RwLock::new(Committed::default()),
            writer: Arc::new(Mutex::new(())),
        }
    }
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Committed>, StoreError> {
        self.committed
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Committed>, StoreError> {
        self.committed
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    type Scope = InMemoryScope;

    async fn begin(&self, timeout: Duration) -> Result<InMemoryScope, StoreError> {
        let gate = tokio::time::timeout(timeout, self.writer.clone().lock_owned())
            .await
            .map_err(|_| StoreError::Timeout(format!("no write scope within {timeout:?}")))?;

        let committed = self.read()?;
        Ok(InMemoryScope {
            _gate: gate,
            state: StockState::clone(&committed.state),
            pending: Vec::new(),
            next_sequence: committed.ledger.len() as u64 + 1,
        })
    }

    async fn commit(&self, scope: InMemoryScope) -> Result<(), StoreError> {
        let InMemoryScope {
            _gate,
            state,
            pending,
            ..
        } = scope;
        let mut committed = self.write()?;
        committed.state = Arc::new(state);
        committed.ledger.extend(pending);
        Ok(())
    }

    async fn rollback(&self, scope: InMemoryScope) -> Result<(), StoreError> {
        drop(scope);
        Ok(())
    }
}

#[async_trait]
impl StockRepository for InMemoryStockStore {
    async fn save_location(&self, location: &Location) -> Result<(), StoreError> {
        let _gate = self.writer.lock().await;
        let mut committed = self.write()?;
        Arc::make_mut(&mut committed.state)
            .locations
            .insert(location.id, location.clone());
        Ok(())
    }

    async fn location(
        &self,
        scope: &mut InMemoryScope,
        id: LocationId,
    ) -> Result<Location, StoreError> {
        scope
            .state
            .locations
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("location {id}")))
    }

    async fn find(
        &self,
        scope: &mut InMemoryScope,
        key: &StockKey,
    ) -> Result<Option<StockRecord>, StoreError> {
        Ok(scope
            .state
            .by_key
            .get(key)
            .and_then(|id| scope.state.records.get(id))
            .cloned())
    }

    async fn get(
        &self,
        scope: &mut InMemoryScope,
        id: StockRecordId,
    ) -> Result<Option<StockRecord>, StoreError> {
        Ok(scope.state.records.get(&id).cloned())
    }

    async fn upsert_add(
        &self,
        scope: &mut InMemoryScope,
        key: &StockKey,
        quantity: i64,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
    ) -> Result<StockRecord, StoreError> {
        let state = &mut scope.state;
        if !state.locations.contains_key(&key.location_id) {
            return Err(StoreError::not_found(format!("location {}", key.location_id)));
        }

        if let Some(id) = state.by_key.get(key).copied() {
            let record = state.record_mut(id)?;
            record.add(quantity)?;
            return Ok(record.clone());
        }

        let record =
            StockRecord::new(StockRecordId::new(), key.clone(), quantity, expiry, received_at)?;
        state.by_key.insert(key.clone(), record.id_typed());
        state.records.insert(record.id_typed(), record.clone());
        Ok(record)
    }

    async fn decrement(
        &self,
        scope: &mut InMemoryScope,
        id: StockRecordId,
        quantity: i64,
    ) -> Result<Option<StockRecord>, StoreError> {
        scope.state.record_mut(id)?.remove(quantity)?;
        Ok(scope.state.settle(id))
    }

    async fn set_on_hand(
        &self,
        scope: &mut InMemoryScope,
        id: StockRecordId,
        counted: i64,
    ) -> Result<(i64, Option<StockRecord>), StoreError> {
        let delta = scope.state.record_mut(id)?.recount(counted)?;
        Ok((delta, scope.state.settle(id)))
    }

    async fn list_available(
        &self,
        scope: &mut InMemoryScope,
        item: ItemId,
        filter: &LocationFilter,
    ) -> Result<Vec<StockPosition>, StoreError> {
        Ok(scope.state.positions(item, filter))
    }

    async fn positions(
        &self,
        item: ItemId,
        filter: &LocationFilter,
    ) -> Result<Vec<StockPosition>, StoreError> {
        Ok(self.read()?.state.positions(item, filter))
    }

    async fn on_hand_total(&self, item: ItemId) -> Result<i64, StoreError> {
        Ok(self
            .read()?
            .state
            .records
            .values()
            .filter(|r| r.item_id() == item)
            .map(StockRecord::on_hand)
            .sum())
    }
}

#[async_trait]
impl LedgerWriter for InMemoryStockStore {
    async fn append(
        &self,
        scope: &mut InMemoryScope,
        movement: NewMovement,
    ) -> Result<MovementRecord, StoreError> {
        movement.validate()?;
        let record = MovementRecord::from_new(MovementId::new(), scope.next_sequence, movement);
        scope.next_sequence += 1;
        scope.pending.push(record.clone());
        Ok(record)
    }

    async fn history(&self, item: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
        Ok(self
            .read()?
            .ledger
            .iter()
            .filter(|m| m.item_id == item)
            .cloned()
            .collect())
    }

    async fn movements_after(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let committed = self.read()?;
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(committed.ledger.len());
        Ok(committed.ledger[start..].iter().take(limit).cloned().collect())
    }
}

#[async_trait]
impl ContainerRepository for InMemoryStockStore {
    async fn insert_container(
        &self,
        scope: &mut InMemoryScope,
        container: &Container,
    ) -> Result<(), StoreError> {
        let state = &mut scope.state;
        if state.container_codes.contains_key(container.code()) {
            return Err(StoreError::Conflict(format!(
                "container code {} already exists",
                container.code()
            )));
        }
        state
            .container_codes
            .insert(container.code().clone(), container.id_typed());
        state.containers.insert(container.id_typed(), container.clone());
        Ok(())
    }

    async fn container_for_update(
        &self,
        scope: &mut InMemoryScope,
        id: ContainerId,
    ) -> Result<Container, StoreError> {
        scope
            .state
            .containers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("container {id}")))
    }

    async fn save_container(
        &self,
        scope: &mut InMemoryScope,
        container: &Container,
    ) -> Result<(), StoreError> {
        let slot = scope
            .state
            .containers
            .get_mut(&container.id_typed())
            .ok_or_else(|| StoreError::not_found(format!("container {}", container.id_typed())))?;
        *slot = container.clone();
        Ok(())
    }

    async fn container(&self, id: ContainerId) -> Result<Option<Container>, StoreError> {
        Ok(self.read()?.state.containers.get(&id).cloned())
    }

    async fn container_by_code(
        &self,
        code: &ContainerCode,
    ) -> Result<Option<Container>, StoreError> {
        let committed = self.read()?;
        Ok(committed
            .state
            .container_codes
            .get(code)
            .and_then(|id| committed.state.containers.get(id))
            .cloned())
    }

    async fn open_containers(&self) -> Result<Vec<Container>, StoreError> {
        let mut open: Vec<Container> = self
            .read()?
            .state
            .containers
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|c| c.created_at());
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wms_core::{DomainError, WarehouseId};

    const T: Duration = Duration::from_millis(200);

    async fn store_with_location() -> (InMemoryStockStore, Location) {
        let store = InMemoryStockStore::new();
        let loc = Location::new(LocationId::new(), "A-01", WarehouseId::new()).unwrap();
        store.save_location(&loc).await.unwrap();
        (store, loc)
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let (store, loc) = store_with_location().await;
        let item = ItemId::new();
        let key = StockKey::new(item, loc.id);

        let mut scope = store.begin(T).await.unwrap();
        store.upsert_add(&mut scope, &key, 5, None, Utc::now()).await.unwrap();
        store
            .append(&mut scope, NewMovement::receive(item, loc.id, 5, Utc::now(), "u", "PO"))
            .await
            .unwrap();
        assert_eq!(store.on_hand_total(item).await.unwrap(), 0);

        store.commit(scope).await.unwrap();
        assert_eq!(store.on_hand_total(item).await.unwrap(), 5);
        let history = store.history(item).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sequence, 1);
    }

    #[tokio::test]
    async fn rollback_discards_everything() {
        let (store, loc) = store_with_location().await;
        let item = ItemId::new();

        let mut scope = store.begin(T).await.unwrap();
        store
            .upsert_add(&mut scope, &StockKey::new(item, loc.id), 5, None, Utc::now())
            .await
            .unwrap();
        store
            .append(&mut scope, NewMovement::receive(item, loc.id, 5, Utc::now(), "u", "PO"))
            .await
            .unwrap();
        store.rollback(scope).await.unwrap();

        assert_eq!(store.on_hand_total(item).await.unwrap(), 0);
        assert!(store.history(item).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_writer_times_out_while_scope_is_open() {
        let (store, _) = store_with_location().await;
        let held = store.begin(T).await.unwrap();
        let err = store.begin(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        drop(held);
        assert!(store.begin(T).await.is_ok());
    }

    #[tokio::test]
    async fn decrement_deletes_at_zero_and_rejects_overdraw() {
        let (store, loc) = store_with_location().await;
        let key = StockKey::new(ItemId::new(), loc.id);

        let mut scope = store.begin(T).await.unwrap();
        let rec = store.upsert_add(&mut scope, &key, 4, None, Utc::now()).await.unwrap();
        let err = store.decrement(&mut scope, rec.id_typed(), 5).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(DomainError::InsufficientStock { requested: 5, available: 4 })
        ));
        assert!(store.decrement(&mut scope, rec.id_typed(), 4).await.unwrap().is_none());
        assert!(store.find(&mut scope, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_available_sees_scope_writes_and_honours_filter() {
        let (store, loc) = store_with_location().await;
        let elsewhere = Location::new(LocationId::new(), "B-01", WarehouseId::new()).unwrap();
        store.save_location(&elsewhere).await.unwrap();
        let (item, other_item) = (ItemId::new(), ItemId::new());

        let mut scope = store.begin(T).await.unwrap();
        store
            .upsert_add(&mut scope, &StockKey::new(item, loc.id), 3, None, Utc::now())
            .await
            .unwrap();
        store
            .upsert_add(&mut scope, &StockKey::new(item, elsewhere.id), 4, None, Utc::now())
            .await
            .unwrap();
        store
            .upsert_add(&mut scope, &StockKey::new(other_item, loc.id), 9, None, Utc::now())
            .await
            .unwrap();
        let lot_key = StockKey::new(item, loc.id).with_lot("L2");
        let drained = store
            .upsert_add(&mut scope, &lot_key, 2, None, Utc::now())
            .await
            .unwrap();
        store.decrement(&mut scope, drained.id_typed(), 2).await.unwrap();

        let all = store.list_available(&mut scope, item, &LocationFilter::Any).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|p| p.record.item_id() == item && p.record.available() > 0));
        assert!(store.positions(item, &LocationFilter::Any).await.unwrap().is_empty());

        let filter = LocationFilter::warehouses([loc.warehouse_id]);
        let scoped = store.list_available(&mut scope, item, &filter).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].location.id, loc.id);
        assert_eq!(scoped[0].record.on_hand(), 3);
    }

    #[tokio::test]
    async fn upsert_merges_same_key() {
        let (store, loc) = store_with_location().await;
        let key = StockKey::new(ItemId::new(), loc.id).with_lot("L1");
        let first_seen = Utc::now();

        let mut scope = store.begin(T).await.unwrap();
        let a = store.upsert_add(&mut scope, &key, 2, None, first_seen).await.unwrap();
        let b = store
            .upsert_add(&mut scope, &key, 3, None, first_seen + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(a.id_typed(), b.id_typed());
        assert_eq!(b.on_hand(), 5);
        assert_eq!(b.received_at(), first_seen);
        assert_eq!(b.version(), 2);
    }

    #[tokio::test]
    async fn unknown_location_is_not_found() {
        let store = InMemoryStockStore::new();
        let mut scope = store.begin(T).await.unwrap();
        let key = StockKey::new(ItemId::new(), LocationId::new());
        let err = store.upsert_add(&mut scope, &key, 1, None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_container_code_conflicts() {
        let (store, loc) = store_with_location().await;
        let code = ContainerCode::compose(Utc::now().date_naive(), 1);
        let lines = vec![wms_inventory::ContainerLine::new(ItemId::new(), 1)];
        let now = Utc::now();
        let a = Container::open(ContainerId::new(), code.clone(), loc.id, lines.clone(), "", now)
            .unwrap();
        let b = Container::open(ContainerId::new(), code, loc.id, lines, "", now).unwrap();

        let mut scope = store.begin(T).await.unwrap();
        store.insert_container(&mut scope, &a).await.unwrap();
        let err = store.insert_container(&mut scope, &b).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn movements_after_pages_the_ledger() {
        let (store, loc) = store_with_location().await;
        let item = ItemId::new();
        let mut scope = store.begin(T).await.unwrap();
        for _ in 0..3 {
            store
                .append(&mut scope, NewMovement::receive(item, loc.id, 1, Utc::now(), "u", "PO"))
                .await
                .unwrap();
        }
        store.commit(scope).await.unwrap();

        let page = store.movements_after(1, 10).await.unwrap();
        let seqs: Vec<u64> = page.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert!(store.movements_after(3, 10).await.unwrap().is_empty());
    }
}
