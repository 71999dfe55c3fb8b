//! Postgres-backed stock store.
//!
//! A scope is a database transaction. Touched stock rows are locked with
//! `SELECT ... FOR UPDATE`, every update is guarded by the row `version`, and
//! `lock_timeout` is set per transaction so a blocked row lock surfaces as a
//! timeout instead of waiting forever.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (lock not available) | `55P03` | `Timeout` |
//! | Database (query canceled) | `57014` | `Timeout` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | PoolTimedOut | N/A | `Timeout` |
//! | anything else | N/A | `Backend` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use wms_core::{ContainerId, ItemId, LocationId, MovementId, StockRecordId, WarehouseId};
use wms_inventory::{
    Container, ContainerCode, ContainerLine, ContainerStatus, Location, LocationFilter,
    MovementRecord, MovementType, NewMovement, StockKey, StockPosition, StockRecord,
};

use super::{ContainerRepository, LedgerWriter, StockRepository, StockStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

const STOCK_COLUMNS: &str = "s.id, s.item_id, s.location_id, s.lot, s.serial, s.on_hand, \
     s.allocated, s.expiry, s.received_at, s.version";

const POSITION_COLUMNS: &str = "s.id, s.item_id, s.location_id, s.lot, s.serial, s.on_hand, \
     s.allocated, s.expiry, s.received_at, s.version, \
     l.code AS location_code, l.warehouse_id, l.zone, l.locked";

const MOVEMENT_COLUMNS: &str = "sequence, id, kind, item_id, from_location, to_location, \
     quantity, lot, serial, occurred_at, actor, reference, note";

const CONTAINER_COLUMNS: &str = "id, code, location_id, status, lines, note, created_at, closed_at";

/// Postgres stock, ledger and container store.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn stock_row(
        tx: &mut Transaction<'static, Postgres>,
        id: StockRecordId,
    ) -> Result<Option<StockRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_records s WHERE s.id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("get_stock", e))?;

        row.as_ref().map(stock_from_row).transpose()
    }

    /// Write back a mutated record, deleting it at zero. `previous_version`
    /// is the version read under the row lock.
    async fn persist(
        tx: &mut Transaction<'static, Postgres>,
        record: &StockRecord,
        previous_version: u64,
    ) -> Result<Option<StockRecord>, StoreError> {
        let result = if record.is_depleted() {
            sqlx::query("DELETE FROM stock_records WHERE id = $1 AND version = $2")
                .bind(record.id_typed().as_uuid())
                .bind(previous_version as i64)
                .execute(&mut **tx)
                .await
        } else {
            sqlx::query(
                r#"
                UPDATE stock_records
                SET on_hand = $3, allocated = $4, version = $5
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(record.id_typed().as_uuid())
            .bind(previous_version as i64)
            .bind(record.on_hand())
            .bind(record.allocated())
            .bind(record.version() as i64)
            .execute(&mut **tx)
            .await
        }
        .map_err(|e| map_sqlx_error("persist_stock", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "stock record {} changed concurrently",
                record.id_typed()
            )));
        }

        Ok((!record.is_depleted()).then(|| record.clone()))
    }

    async fn positions_with(
        executor: impl sqlx::PgExecutor<'_>,
        item: ItemId,
        filter: &LocationFilter,
        lock: bool,
    ) -> Result<Vec<StockPosition>, StoreError> {
        let (warehouses, locations) = filter_params(filter);
        let sql = format!(
            r#"
            SELECT {POSITION_COLUMNS}
            FROM stock_records s
            JOIN locations l ON l.id = s.location_id
            WHERE s.item_id = $1
              AND s.on_hand - s.allocated > 0
              AND ($2::uuid[] IS NULL OR l.warehouse_id = ANY($2))
              AND ($3::uuid[] IS NULL OR l.id = ANY($3))
            {}
            "#,
            if lock { "FOR UPDATE OF s" } else { "" }
        );

        let rows = sqlx::query(&sql)
            .bind(item.as_uuid())
            .bind(warehouses)
            .bind(locations)
            .fetch_all(executor)
            .await
            .map_err(|e| map_sqlx_error("list_positions", e))?;

        rows.iter()
            .map(|row| {
                let record = stock_from_row(row)?;
                let location = location_from_row(row, "location_code", "location_id")?;
                Ok(StockPosition { record, location })
            })
            .collect()
    }

    async fn movements(
        &self,
        operation: &'static str,
        sql: &str,
        first: Uuid,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let rows = sqlx::query(sql)
            .bind(first)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(movement_from_row).collect()
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    type Scope = Transaction<'static, Postgres>;

    #[instrument(skip(self), err)]
    async fn begin(&self, timeout: Duration) -> Result<Self::Scope, StoreError> {
        let mut tx = tokio::time::timeout(timeout, self.pool.begin())
            .await
            .map_err(|_| StoreError::Timeout(format!("no connection within {timeout:?}")))?
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let ms = timeout.as_millis().max(1);
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{ms}ms"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(tx)
    }

    async fn commit(&self, scope: Self::Scope) -> Result<(), StoreError> {
        scope
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(&self, scope: Self::Scope) -> Result<(), StoreError> {
        scope
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback_transaction", e))
    }
}

#[async_trait]
impl StockRepository for PostgresStockStore {
    #[instrument(
        skip(self, location),
        fields(location_id = %location.id, code = %location.code),
        err
    )]
    async fn save_location(&self, location: &Location) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO locations (id, code, warehouse_id, zone, locked)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                warehouse_id = EXCLUDED.warehouse_id,
                zone = EXCLUDED.zone,
                locked = EXCLUDED.locked
            "#,
        )
        .bind(location.id.as_uuid())
        .bind(&location.code)
        .bind(location.warehouse_id.as_uuid())
        .bind(location.zone.as_deref())
        .bind(location.locked)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_location", e))?;
        Ok(())
    }

    async fn location(
        &self,
        scope: &mut Self::Scope,
        id: LocationId,
    ) -> Result<Location, StoreError> {
        // FOR SHARE keeps the lock flag stable until the scope ends.
        let row = sqlx::query(
            "SELECT id, code, warehouse_id, zone, locked FROM locations WHERE id = $1 FOR SHARE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut **scope)
        .await
        .map_err(|e| map_sqlx_error("get_location", e))?
        .ok_or_else(|| StoreError::not_found(format!("location {id}")))?;

        location_from_row(&row, "code", "id")
    }

    async fn find(
        &self,
        scope: &mut Self::Scope,
        key: &StockKey,
    ) -> Result<Option<StockRecord>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {STOCK_COLUMNS} FROM stock_records s
            WHERE s.item_id = $1 AND s.location_id = $2 AND s.lot = $3 AND s.serial = $4
            FOR UPDATE
            "#
        ))
        .bind(key.item_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .bind(key.lot.as_deref().unwrap_or(""))
        .bind(key.serial.as_deref().unwrap_or(""))
        .fetch_optional(&mut **scope)
        .await
        .map_err(|e| map_sqlx_error("find_stock", e))?;

        row.as_ref().map(stock_from_row).transpose()
    }

    async fn get(
        &self,
        scope: &mut Self::Scope,
        id: StockRecordId,
    ) -> Result<Option<StockRecord>, StoreError> {
        Self::stock_row(scope, id).await
    }

    #[instrument(
        skip(self, scope, key),
        fields(item_id = %key.item_id, location_id = %key.location_id),
        err
    )]
    async fn upsert_add(
        &self,
        scope: &mut Self::Scope,
        key: &StockKey,
        quantity: i64,
        expiry: Option<NaiveDate>,
        received_at: DateTime<Utc>,
    ) -> Result<StockRecord, StoreError> {
        if let Some(mut record) = self.find(scope, key).await? {
            let previous = record.version();
            record.add(quantity)?;
            Self::persist(scope, &record, previous).await?;
            return Ok(record);
        }

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM locations WHERE id = $1")
            .bind(key.location_id.as_uuid())
            .fetch_optional(&mut **scope)
            .await
            .map_err(|e| map_sqlx_error("check_location", e))?;
        if exists.is_none() {
            return Err(StoreError::not_found(format!("location {}", key.location_id)));
        }

        let record =
            StockRecord::new(StockRecordId::new(), key.clone(), quantity, expiry, received_at)?;
        sqlx::query(
            r#"
            INSERT INTO stock_records (
                id, item_id, location_id, lot, serial,
                on_hand, allocated, expiry, received_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id_typed().as_uuid())
        .bind(key.item_id.as_uuid())
        .bind(key.location_id.as_uuid())
        .bind(key.lot.as_deref().unwrap_or(""))
        .bind(key.serial.as_deref().unwrap_or(""))
        .bind(record.on_hand())
        .bind(record.allocated())
        .bind(record.expiry())
        .bind(record.received_at())
        .bind(record.version() as i64)
        .execute(&mut **scope)
        .await
        .map_err(|e| map_sqlx_error("insert_stock", e))?;

        Ok(record)
    }

    #[instrument(skip(self, scope), fields(record_id = %id), err)]
    async fn decrement(
        &self,
        scope: &mut Self::Scope,
        id: StockRecordId,
        quantity: i64,
    ) -> Result<Option<StockRecord>, StoreError> {
        let mut record = Self::stock_row(scope, id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("stock record {id}")))?;
        let previous = record.version();
        record.remove(quantity)?;
        Self::persist(scope, &record, previous).await
    }

    #[instrument(skip(self, scope), fields(record_id = %id), err)]
    async fn set_on_hand(
        &self,
        scope: &mut Self::Scope,
        id: StockRecordId,
        counted: i64,
    ) -> Result<(i64, Option<StockRecord>), StoreError> {
        let mut record = Self::stock_row(scope, id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("stock record {id}")))?;
        let previous = record.version();
        let delta = record.recount(counted)?;
        let remaining = Self::persist(scope, &record, previous).await?;
        Ok((delta, remaining))
    }

    async fn list_available(
        &self,
        scope: &mut Self::Scope,
        item: ItemId,
        filter: &LocationFilter,
    ) -> Result<Vec<StockPosition>, StoreError> {
        Self::positions_with(&mut **scope, item, filter, true).await
    }

    async fn positions(
        &self,
        item: ItemId,
        filter: &LocationFilter,
    ) -> Result<Vec<StockPosition>, StoreError> {
        Self::positions_with(&self.pool, item, filter, false).await
    }

    async fn on_hand_total(&self, item: ItemId) -> Result<i64, StoreError> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT SUM(on_hand)::BIGINT FROM stock_records WHERE item_id = $1")
                .bind(item.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("on_hand_total", e))?;
        Ok(total.unwrap_or(0))
    }
}

#[async_trait]
impl LedgerWriter for PostgresStockStore {
    #[instrument(
        skip(self, scope, movement),
        fields(kind = %movement.kind, item_id = %movement.item_id),
        err
    )]
    async fn append(
        &self,
        scope: &mut Self::Scope,
        movement: NewMovement,
    ) -> Result<MovementRecord, StoreError> {
        movement.validate()?;
        let id = MovementId::new();

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO stock_movements (
                id, kind, item_id, from_location, to_location, quantity,
                lot, serial, occurred_at, actor, reference, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING sequence
            "#,
        )
        .bind(id.as_uuid())
        .bind(movement.kind.as_str())
        .bind(movement.item_id.as_uuid())
        .bind(movement.from_location.map(|l| *l.as_uuid()))
        .bind(movement.to_location.map(|l| *l.as_uuid()))
        .bind(movement.quantity)
        .bind(movement.lot.as_deref())
        .bind(movement.serial.as_deref())
        .bind(movement.occurred_at)
        .bind(&movement.actor)
        .bind(&movement.reference)
        .bind(&movement.note)
        .fetch_one(&mut **scope)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        Ok(MovementRecord::from_new(id, sequence as u64, movement))
    }

    async fn history(&self, item: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
        self.movements(
            "history",
            &format!(
                "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
                 WHERE item_id = $1 ORDER BY sequence ASC"
            ),
            *item.as_uuid(),
        )
        .await
    }

    async fn movements_after(
        &self,
        after: u64,
        limit: usize,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE sequence > $1 ORDER BY sequence ASC LIMIT $2"
        ))
        .bind(after as i64)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements_after", e))?;
        rows.iter().map(movement_from_row).collect()
    }
}

#[async_trait]
impl ContainerRepository for PostgresStockStore {
    #[instrument(skip(self, scope, container), fields(code = %container.code()), err)]
    async fn insert_container(
        &self,
        scope: &mut Self::Scope,
        container: &Container,
    ) -> Result<(), StoreError> {
        let lines = serde_json::to_value(container.lines()).map_err(|e| {
            StoreError::backend(format!("container lines serialization failed: {e}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO containers
                (id, code, location_id, status, lines, note, created_at, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(container.id_typed().as_uuid())
        .bind(container.code().as_str())
        .bind(container.location_id().as_uuid())
        .bind(status_str(container.status()))
        .bind(lines)
        .bind(container.note())
        .bind(container.created_at())
        .bind(container.closed_at())
        .execute(&mut **scope)
        .await
        .map_err(|e| map_sqlx_error("insert_container", e))?;
        Ok(())
    }

    async fn container_for_update(
        &self,
        scope: &mut Self::Scope,
        id: ContainerId,
    ) -> Result<Container, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **scope)
        .await
        .map_err(|e| map_sqlx_error("container_for_update", e))?
        .ok_or_else(|| StoreError::not_found(format!("container {id}")))?;
        container_from_row(&row)
    }

    async fn save_container(
        &self,
        scope: &mut Self::Scope,
        container: &Container,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE containers SET location_id = $2, status = $3, note = $4, closed_at = $5 \
             WHERE id = $1",
        )
        .bind(container.id_typed().as_uuid())
        .bind(container.location_id().as_uuid())
        .bind(status_str(container.status()))
        .bind(container.note())
        .bind(container.closed_at())
        .execute(&mut **scope)
        .await
        .map_err(|e| map_sqlx_error("save_container", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("container {}", container.id_typed())));
        }
        Ok(())
    }

    async fn container(&self, id: ContainerId) -> Result<Option<Container>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CONTAINER_COLUMNS} FROM containers WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_container", e))?;
        row.as_ref().map(container_from_row).transpose()
    }

    async fn container_by_code(
        &self,
        code: &ContainerCode,
    ) -> Result<Option<Container>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers WHERE code = $1"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_container_by_code", e))?;
        row.as_ref().map(container_from_row).transpose()
    }

    async fn open_containers(&self) -> Result<Vec<Container>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM containers \
             WHERE status = 'open' ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_containers", e))?;
        rows.iter().map(container_from_row).collect()
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("57014") => StoreError::Timeout(msg),
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::backend(format!("failed to decode row: {err}"))
}

fn filter_params(filter: &LocationFilter) -> (Option<Vec<Uuid>>, Option<Vec<Uuid>>) {
    if filter.is_unrestricted() {
        return (None, None);
    }
    match filter {
        LocationFilter::Any => (None, None),
        LocationFilter::Warehouses(set) => (Some(set.iter().map(|w| *w.as_uuid()).collect()), None),
        LocationFilter::Locations(set) => (None, Some(set.iter().map(|l| *l.as_uuid()).collect())),
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn status_str(status: ContainerStatus) -> &'static str {
    match status {
        ContainerStatus::Open => "open",
        ContainerStatus::Closed => "closed",
    }
}

// SQLx row types

#[derive(Debug)]
struct StockRow {
    id: Uuid,
    item_id: Uuid,
    location_id: Uuid,
    lot: String,
    serial: String,
    on_hand: i64,
    allocated: i64,
    expiry: Option<NaiveDate>,
    received_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            id: row.try_get("id")?,
            item_id: row.try_get("item_id")?,
            location_id: row.try_get("location_id")?,
            lot: row.try_get("lot")?,
            serial: row.try_get("serial")?,
            on_hand: row.try_get("on_hand")?,
            allocated: row.try_get("allocated")?,
            expiry: row.try_get("expiry")?,
            received_at: row.try_get("received_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<StockRow> for StockRecord {
    type Error = StoreError;

    fn try_from(row: StockRow) -> Result<Self, StoreError> {
        let key = StockKey {
            item_id: ItemId::from_uuid(row.item_id),
            location_id: LocationId::from_uuid(row.location_id),
            lot: non_empty(row.lot),
            serial: non_empty(row.serial),
        };
        Ok(StockRecord::restore(
            StockRecordId::from_uuid(row.id),
            key,
            row.on_hand,
            row.allocated,
            row.expiry,
            row.received_at,
            row.version as u64,
        )?)
    }
}

fn stock_from_row(row: &PgRow) -> Result<StockRecord, StoreError> {
    StockRecord::try_from(StockRow::from_row(row).map_err(decode_error)?)
}

fn location_from_row(
    row: &PgRow,
    code_column: &str,
    id_column: &str,
) -> Result<Location, StoreError> {
    let id: Uuid = row.try_get(id_column).map_err(decode_error)?;
    let code: String = row.try_get(code_column).map_err(decode_error)?;
    let warehouse: Uuid = row.try_get("warehouse_id").map_err(decode_error)?;
    let zone: Option<String> = row.try_get("zone").map_err(decode_error)?;
    let locked: bool = row.try_get("locked").map_err(decode_error)?;

    let mut location = Location::new(
        LocationId::from_uuid(id),
        code,
        WarehouseId::from_uuid(warehouse),
    )?;
    location.zone = zone;
    location.locked = locked;
    Ok(location)
}

fn movement_from_row(row: &PgRow) -> Result<MovementRecord, StoreError> {
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let sequence: i64 = row.try_get("sequence").map_err(decode_error)?;
    let from: Option<Uuid> = row.try_get("from_location").map_err(decode_error)?;
    let to: Option<Uuid> = row.try_get("to_location").map_err(decode_error)?;

    Ok(MovementRecord {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode_error)?),
        sequence: sequence as u64,
        kind: MovementType::parse(&kind)?,
        item_id: ItemId::from_uuid(row.try_get("item_id").map_err(decode_error)?),
        from_location: from.map(LocationId::from_uuid),
        to_location: to.map(LocationId::from_uuid),
        quantity: row.try_get("quantity").map_err(decode_error)?,
        lot: row.try_get("lot").map_err(decode_error)?,
        serial: row.try_get("serial").map_err(decode_error)?,
        occurred_at: row.try_get("occurred_at").map_err(decode_error)?,
        actor: row.try_get("actor").map_err(decode_error)?,
        reference: row.try_get("reference").map_err(decode_error)?,
        note: row.try_get("note").map_err(decode_error)?,
    })
}

fn container_from_row(row: &PgRow) -> Result<Container, StoreError> {
    let status: String = row.try_get("status").map_err(decode_error)?;
    let status = match status.as_str() {
        "open" => ContainerStatus::Open,
        "closed" => ContainerStatus::Closed,
        other => {
            return Err(StoreError::backend(format!("unknown container status '{other}'")));
        }
    };
    let lines: serde_json::Value = row.try_get("lines").map_err(decode_error)?;
    let lines: Vec<ContainerLine> = serde_json::from_value(lines)
        .map_err(|e| StoreError::backend(format!("container lines deserialization failed: {e}")))?;
    let code: String = row.try_get("code").map_err(decode_error)?;

    Ok(Container::restore(
        ContainerId::from_uuid(row.try_get("id").map_err(decode_error)?),
        ContainerCode::parse(code)?,
        LocationId::from_uuid(row.try_get("location_id").map_err(decode_error)?),
        status,
        lines,
        row.try_get("note").map_err(decode_error)?,
        row.try_get("created_at").map_err(decode_error)?,
        row.try_get("closed_at").map_err(decode_error)?,
    ))
}
