//! Postgres-backed inventory store.
//!
//! Units of work are SQL transactions. Positions read for validation are locked with
//! `SELECT ... FOR UPDATE`; multi-row locks are taken in ascending `material_id` order so
//! two units of work touching the same pair of positions queue instead of deadlocking.
//!
//! ## Error Mapping
//!
//! | SQLx error                                   | StoreError    |
//! |----------------------------------------------|---------------|
//! | `23505` unique violation                     | `Conflict`    |
//! | `40001` serialization / `40P01` deadlock     | `Conflict`    |
//! | `23514` check violation                      | `Domain` (invariant) |
//! | `23503` foreign key violation                | `NotFound`    |
//! | `22xxx` data exception (e.g. `22003` overflow) | `Domain` (validation) |
//! | `RowNotFound`                                | `NotFound`    |
//! | anything else (pool, I/O, TLS, protocol)     | `Unavailable` |

use core::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use stockledger_core::{
    CustomerId, DomainError, IncomingId, LedgerEntryId, LocationId, PositionId, Quantity, StockId,
};
use stockledger_inventory::{
    IncomingRecord, LayerAmendment, LedgerEntry, MaterialPosition, MaterialType, NewIncoming,
    NewLedgerEntry, NewPosition, PositionKey, ReorderThresholds,
};

use super::r#trait::{
    IncomingStaging, InventoryStore, LedgerStore, MaterialStore, StoreError, StoreResult,
    UnitOfWork,
};
use crate::config::DatabaseConfig;
use crate::reporting::{LedgerFilter, LedgerLine};

macro_rules! position_columns {
    () => {
        "material_id, stock_id, location_id, customer_id, owner, material_type, description, \
         notes, quantity, unit_cost, min_required_quantity, max_required_quantity, is_active, \
         updated_at"
    };
}

macro_rules! entry_columns {
    () => {
        "transaction_id, material_id, stock_id, quantity_change, unit_cost, notes, job_ticket, \
         updated_at, remaining_quantity"
    };
}

macro_rules! incoming_columns {
    () => {
        "shipping_id, customer_id, stock_id, material_type, quantity, unit_cost, \
         min_required_quantity, max_required_quantity, notes, is_active, owner, created_at"
    };
}

/// Postgres-backed inventory store.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unit of work over [`PostgresInventoryStore`]: one SQL transaction.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl core::fmt::Debug for PostgresUnitOfWork {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresUnitOfWork").finish_non_exhaustive()
    }
}

#[async_trait]
impl MaterialStore for PostgresUnitOfWork {
    async fn get_position(&mut self, id: PositionId) -> StoreResult<Option<MaterialPosition>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            position_columns!(),
            " FROM materials WHERE material_id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_position", e))?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn find_position(&mut self, key: &PositionKey) -> StoreResult<Option<MaterialPosition>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            position_columns!(),
            " FROM materials WHERE stock_id = $1 AND location_id = $2 AND owner = $3"
        ))
        .bind(key.stock_id.as_str())
        .bind(key.location_id.get())
        .bind(&key.owner)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_position", e))?;
        row.as_ref().map(position_from_row).transpose()
    }

    #[instrument(skip(self), fields(count = ids.len()), err)]
    async fn lock_positions(&mut self, ids: &[PositionId]) -> StoreResult<Vec<MaterialPosition>> {
        let mut raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        raw.sort_unstable();
        raw.dedup();

        let rows = sqlx::query(concat!(
            "SELECT ",
            position_columns!(),
            " FROM materials WHERE material_id = ANY($1) ORDER BY material_id FOR UPDATE"
        ))
        .bind(&raw)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_positions", e))?;

        let locked = rows
            .iter()
            .map(position_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        if let Some(missing) = raw
            .iter()
            .find(|id| !locked.iter().any(|p| p.id.get() == **id))
        {
            return Err(StoreError::NotFound(format!("material position {missing}")));
        }
        Ok(locked)
    }

    async fn create_position(
        &mut self,
        new: NewPosition,
        at: DateTime<Utc>,
    ) -> StoreResult<MaterialPosition> {
        sqlx::query(
            r#"
            INSERT INTO materials (
                stock_id, location_id, customer_id, owner, material_type, description, notes,
                quantity, unit_cost, min_required_quantity, max_required_quantity, is_active,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9, $10, $11, $12)
            ON CONFLICT (stock_id, location_id, owner) DO NOTHING
            "#,
        )
        .bind(new.stock_id.as_str())
        .bind(new.location_id.get())
        .bind(new.customer_id.get())
        .bind(&new.owner)
        .bind(new.material_type.as_str())
        .bind(&new.description)
        .bind(&new.notes)
        .bind(new.unit_cost)
        .bind(new.thresholds.min)
        .bind(new.thresholds.max)
        .bind(new.is_active)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("create_position", e))?;

        let row = sqlx::query(concat!(
            "SELECT ",
            position_columns!(),
            " FROM materials WHERE stock_id = $1 AND location_id = $2 AND owner = $3 FOR UPDATE"
        ))
        .bind(new.stock_id.as_str())
        .bind(new.location_id.get())
        .bind(&new.owner)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("create_position", e))?;
        position_from_row(&row)
    }

    #[instrument(skip(self, notes, at), err)]
    async fn adjust_quantity(
        &mut self,
        id: PositionId,
        delta: Quantity,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<MaterialPosition> {
        let row = sqlx::query(concat!(
            "UPDATE materials SET quantity = quantity + $2, notes = COALESCE($3, notes), \
             updated_at = $4 WHERE material_id = $1 AND quantity + $2 >= 0 RETURNING ",
            position_columns!()
        ))
        .bind(id.get())
        .bind(delta)
        .bind(notes)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_quantity", e))?;

        if let Some(row) = row {
            return position_from_row(&row);
        }

        let available: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM materials WHERE material_id = $1")
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("adjust_quantity", e))?;
        match available {
            Some(available) => Err(DomainError::insufficient(-delta, available).into()),
            None => Err(StoreError::NotFound(format!("material position {id}"))),
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresUnitOfWork {
    #[instrument(
        skip(self),
        fields(material_id = %position_id, stock_id = %stock_id, entries = tracing::field::Empty),
        err
    )]
    async fn layer_snapshot(
        &mut self,
        position_id: PositionId,
        stock_id: &StockId,
    ) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM transactions_log WHERE material_id = $1 AND stock_id = $2 \
             ORDER BY transaction_id"
        ))
        .bind(position_id.get())
        .bind(stock_id.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("layer_snapshot", e))?;

        Span::current().record("entries", rows.len());
        rows.iter().map(entry_from_row).collect()
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> StoreResult<LedgerEntry> {
        let row = sqlx::query(concat!(
            "INSERT INTO transactions_log (material_id, stock_id, quantity_change, unit_cost, \
             notes, job_ticket, updated_at, remaining_quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING ",
            entry_columns!()
        ))
        .bind(entry.position_id.get())
        .bind(entry.stock_id.as_str())
        .bind(entry.quantity_change)
        .bind(entry.unit_cost)
        .bind(&entry.notes)
        .bind(entry.job_ticket.as_deref())
        .bind(entry.updated_at)
        .bind(entry.remaining_quantity)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;
        entry_from_row(&row)
    }

    async fn amend_layer(
        &mut self,
        id: LedgerEntryId,
        amendment: LayerAmendment,
    ) -> StoreResult<LedgerEntry> {
        let query = match amendment {
            LayerAmendment::Merge { quantity, at } => sqlx::query(concat!(
                "UPDATE transactions_log SET quantity_change = quantity_change + $2, \
                 remaining_quantity = remaining_quantity + $2, updated_at = $3 \
                 WHERE transaction_id = $1 AND quantity_change > 0 RETURNING ",
                entry_columns!()
            ))
            .bind(id.get())
            .bind(quantity)
            .bind(at),
            LayerAmendment::Draw { quantity } => sqlx::query(concat!(
                "UPDATE transactions_log SET remaining_quantity = remaining_quantity - $2 \
                 WHERE transaction_id = $1 AND quantity_change > 0 RETURNING ",
                entry_columns!()
            ))
            .bind(id.get())
            .bind(quantity),
        };

        let row = query
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("amend_layer", e))?;
        match row {
            Some(row) => entry_from_row(&row),
            None => Err(StoreError::NotFound(format!("cost layer {id}"))),
        }
    }
}

#[async_trait]
impl IncomingStaging for PostgresUnitOfWork {
    async fn enqueue(&mut self, new: NewIncoming, at: DateTime<Utc>) -> StoreResult<IncomingRecord> {
        new.validate()?;
        let row = sqlx::query(concat!(
            "INSERT INTO incoming_materials (customer_id, stock_id, material_type, quantity, \
             unit_cost, min_required_quantity, max_required_quantity, notes, is_active, owner, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING ",
            incoming_columns!()
        ))
        .bind(new.customer_id.get())
        .bind(new.stock_id.as_str())
        .bind(new.material_type.as_str())
        .bind(new.quantity)
        .bind(new.unit_cost)
        .bind(new.thresholds.min)
        .bind(new.thresholds.max)
        .bind(&new.notes)
        .bind(new.is_active)
        .bind(&new.owner)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("enqueue", e))?;
        incoming_from_row(&row)
    }

    async fn dequeue(&mut self, id: IncomingId) -> StoreResult<IncomingRecord> {
        let row = sqlx::query(concat!(
            "SELECT ",
            incoming_columns!(),
            " FROM incoming_materials WHERE shipping_id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("dequeue", e))?;
        match row {
            Some(row) => incoming_from_row(&row),
            None => Err(StoreError::NotFound(format!("incoming material {id}"))),
        }
    }

    async fn delete(&mut self, id: IncomingId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM incoming_materials WHERE shipping_id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_incoming", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("incoming material {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    type Work = PostgresUnitOfWork;

    async fn begin(&self) -> StoreResult<PostgresUnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresUnitOfWork { tx })
    }

    async fn list_positions(&self) -> StoreResult<Vec<MaterialPosition>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            position_columns!(),
            " FROM materials ORDER BY material_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_positions", e))?;
        rows.iter().map(position_from_row).collect()
    }

    async fn position(&self, id: PositionId) -> StoreResult<Option<MaterialPosition>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            position_columns!(),
            " FROM materials WHERE material_id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("position", e))?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn list_incoming(&self) -> StoreResult<Vec<IncomingRecord>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            incoming_columns!(),
            " FROM incoming_materials ORDER BY shipping_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_incoming", e))?;
        rows.iter().map(incoming_from_row).collect()
    }

    async fn position_entries(&self, id: PositionId) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM transactions_log WHERE material_id = $1 ORDER BY transaction_id"
        ))
        .bind(id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("position_entries", e))?;
        rows.iter().map(entry_from_row).collect()
    }

    #[instrument(skip(self, filter), err)]
    async fn ledger_lines(&self, filter: &LedgerFilter) -> StoreResult<Vec<LedgerLine>> {
        let rows = sqlx::query(
            r#"
            SELECT
                t.transaction_id, t.material_id, t.stock_id, t.quantity_change, t.unit_cost,
                t.notes, t.job_ticket, t.updated_at, t.remaining_quantity,
                m.customer_id, m.location_id, m.material_type
            FROM transactions_log t
            JOIN materials m ON m.material_id = t.material_id
            WHERE ($1::BIGINT IS NULL OR m.customer_id = $1)
              AND ($2::TEXT IS NULL OR m.material_type = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR t.updated_at >= $3)
              AND ($4::TIMESTAMPTZ IS NULL OR t.updated_at < $4)
            ORDER BY t.transaction_id
            "#,
        )
        .bind(filter.customer_id.map(CustomerId::get))
        .bind(filter.material_type.map(MaterialType::as_str))
        .bind(filter.from)
        .bind(filter.until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_lines", e))?;

        rows.iter()
            .map(|row| {
                Ok(LedgerLine {
                    entry: entry_from_row(row)?,
                    customer_id: CustomerId::new(row.try_get("customer_id").map_err(decode)?),
                    location_id: LocationId::new(row.try_get("location_id").map_err(decode)?),
                    material_type: parse_material_type(row)?,
                })
            })
            .collect()
    }
}

fn decode(err: sqlx::Error) -> StoreError {
    map_sqlx_error("decode_row", err)
}

fn corrupt(table: &str, err: DomainError) -> StoreError {
    StoreError::Domain(DomainError::invariant(format!("corrupt {table} row: {err}")))
}

fn parse_material_type(row: &PgRow) -> StoreResult<MaterialType> {
    let raw: String = row.try_get("material_type").map_err(decode)?;
    MaterialType::from_str(&raw).map_err(|e| corrupt("material type", e))
}

fn position_from_row(row: &PgRow) -> StoreResult<MaterialPosition> {
    let stock: String = row.try_get("stock_id").map_err(decode)?;
    Ok(MaterialPosition {
        id: PositionId::new(row.try_get("material_id").map_err(decode)?),
        stock_id: StockId::new(stock).map_err(|e| corrupt("materials", e))?,
        location_id: LocationId::new(row.try_get("location_id").map_err(decode)?),
        customer_id: CustomerId::new(row.try_get("customer_id").map_err(decode)?),
        owner: row.try_get("owner").map_err(decode)?,
        material_type: parse_material_type(row)?,
        description: row.try_get("description").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
        quantity: row.try_get("quantity").map_err(decode)?,
        unit_cost: row.try_get::<Decimal, _>("unit_cost").map_err(decode)?,
        thresholds: ReorderThresholds {
            min: row.try_get("min_required_quantity").map_err(decode)?,
            max: row.try_get("max_required_quantity").map_err(decode)?,
        },
        is_active: row.try_get("is_active").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn entry_from_row(row: &PgRow) -> StoreResult<LedgerEntry> {
    let stock: String = row.try_get("stock_id").map_err(decode)?;
    Ok(LedgerEntry {
        id: LedgerEntryId::new(row.try_get("transaction_id").map_err(decode)?),
        position_id: PositionId::new(row.try_get("material_id").map_err(decode)?),
        stock_id: StockId::new(stock).map_err(|e| corrupt("transactions_log", e))?,
        quantity_change: row.try_get("quantity_change").map_err(decode)?,
        unit_cost: row.try_get::<Decimal, _>("unit_cost").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
        job_ticket: row.try_get("job_ticket").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
        remaining_quantity: row.try_get("remaining_quantity").map_err(decode)?,
    })
}

fn incoming_from_row(row: &PgRow) -> StoreResult<IncomingRecord> {
    let stock: String = row.try_get("stock_id").map_err(decode)?;
    Ok(IncomingRecord {
        id: IncomingId::new(row.try_get("shipping_id").map_err(decode)?),
        customer_id: CustomerId::new(row.try_get("customer_id").map_err(decode)?),
        stock_id: StockId::new(stock).map_err(|e| corrupt("incoming_materials", e))?,
        material_type: parse_material_type(row)?,
        quantity: row.try_get("quantity").map_err(decode)?,
        unit_cost: row.try_get::<Decimal, _>("unit_cost").map_err(decode)?,
        thresholds: ReorderThresholds {
            min: row.try_get("min_required_quantity").map_err(decode)?,
            max: row.try_get("max_required_quantity").map_err(decode)?,
        },
        notes: row.try_get("notes").map_err(decode)?,
        is_active: row.try_get("is_active").map_err(decode)?,
        owner: row.try_get("owner").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

/// Class `22` (data exception: numeric overflow, bad precision) is rejected input.
fn classify_sqlstate(code: Option<&str>, msg: String) -> StoreError {
    match code {
        Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
        Some("23514") => StoreError::Domain(DomainError::invariant(msg)),
        Some("23503") => StoreError::NotFound(msg),
        Some(code) if code.starts_with("22") => StoreError::Domain(DomainError::validation(msg)),
        _ => StoreError::Unavailable(msg),
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            classify_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
