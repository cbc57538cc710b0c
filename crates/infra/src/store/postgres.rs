//! Postgres-backed fulfillment store.
//!
//! ## Locking
//!
//! `begin()` opens a transaction and sets a transaction-local `lock_timeout`.
//! `order_for_update` takes `FOR UPDATE` row locks on every line of the order, so
//! concurrent scans against one order serialize on those rows. The allocation write
//! is a single `INSERT ... ON CONFLICT (line_id, stock_item_id) DO UPDATE`.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | Meaning | StoreError |
//! |-----------------------|---------|------------|
//! | `55P03` | lock_not_available (lock timeout hit) | `Busy` |
//! | `40001` | serialization_failure | `Busy` |
//! | `40P01` | deadlock_detected | `Busy` |
//! | `23505` | unique_violation (racing allocation insert) | `Busy` |
//! | any other | | `Database` |
//!
//! Rows that fail domain validation on load are reported as `Corrupt`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use stockroom_core::{AllocationId, LineItemId, PartId, SalesOrderId, StockItemId};
use stockroom_fulfillment::{AllocationPlan, StockLookup};
use stockroom_inventory::{Part, StockItem};
use stockroom_sales::{Allocation, LineItem, SalesOrder, SalesOrderStatus};

use super::{FulfillmentStore, FulfillmentTx, StoreError};

const LINE_COLUMNS: &str = "id, order_id, line_no, part_id, quantity, shipped, notes";
const STOCK_COLUMNS: &str = "id, part_id, quantity, in_stock, barcode_hash, location";
const ALLOCATION_COLUMNS: &str = "id, line_id, stock_item_id, quantity, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresFulfillmentStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresFulfillmentStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Connect a pool of at most `max_connections`.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))
    }

    async fn lines_of(&self, order_ids: &[Uuid]) -> Result<Vec<LineItem>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM sales_order_lines \
             WHERE order_id = ANY($1) ORDER BY order_id, line_no"
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("lines_of", e))?;
        rows.iter().map(line_from_row).collect()
    }
}

#[async_trait]
impl StockLookup for PostgresFulfillmentStore {
    type Error = StoreError;

    #[instrument(skip(self, hash), err)]
    async fn stock_by_barcode_hash(&self, hash: &str) -> Result<Option<StockItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_items WHERE barcode_hash = $1"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_by_barcode_hash", e))?;
        row.as_ref().map(stock_from_row).transpose()
    }

    #[instrument(skip(self), fields(stock_item = %id), err)]
    async fn stock_by_id(&self, id: StockItemId) -> Result<Option<StockItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_by_id", e))?;
        row.as_ref().map(stock_from_row).transpose()
    }
}

#[async_trait]
impl FulfillmentStore for PostgresFulfillmentStore {
    #[instrument(skip(self), fields(part = %id), err)]
    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError> {
        let row = sqlx::query("SELECT id, name, ipn FROM parts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("part", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    #[instrument(skip(self), fields(sales_order = %id), err)]
    async fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
        let row = sqlx::query("SELECT id, reference, customer, status FROM sales_orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("sales_order", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let lines = self.lines_of(&[*id.as_uuid()]).await?;
        order_from_row(&row, lines).map(Some)
    }

    #[instrument(skip(self), fields(line_item = %id), err)]
    async fn line_item(&self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM sales_order_lines WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("line_item", e))?;
        row.as_ref().map(line_from_row).transpose()
    }

    #[instrument(skip(self), fields(sales_order = %id), err)]
    async fn allocations_for_order(
        &self,
        id: SalesOrderId,
    ) -> Result<Vec<Allocation>, StoreError> {
        let rows = sqlx::query(
            "SELECT a.id, a.line_id, a.stock_item_id, a.quantity, a.created_at, a.updated_at \
             FROM sales_order_allocations a \
             JOIN sales_order_lines l ON l.id = a.line_id \
             WHERE l.order_id = $1 \
             ORDER BY a.created_at",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("allocations_for_order", e))?;
        rows.iter().map(allocation_from_row).collect()
    }

    #[instrument(skip(self), fields(order_count = tracing::field::Empty), err)]
    async fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        let open: Vec<&str> = SalesOrderStatus::OPEN.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query(
            "SELECT id, reference, customer, status FROM sales_orders \
             WHERE status = ANY($1) ORDER BY reference",
        )
        .bind(&open)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_orders", e))?;

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|r| r.try_get::<Uuid, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("open_orders", e))?;
        let mut lines = self.lines_of(&ids).await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("open_orders", e))?;
            let (own, rest): (Vec<LineItem>, Vec<LineItem>) = lines
                .into_iter()
                .partition(|l| l.order_id().as_uuid() == &id);
            lines = rest;
            orders.push(order_from_row(row, own)?);
        }

        Span::current().record("order_count", orders.len());
        Ok(orders)
    }

    #[instrument(skip(self, entry), fields(line_item = %line), err)]
    async fn append_line_note(
        &self,
        line: LineItemId,
        entry: &str,
    ) -> Result<Option<LineItem>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE sales_order_lines \
             SET notes = CASE WHEN notes = '' THEN $2 ELSE notes || chr(10) || $2 END \
             WHERE id = $1 \
             RETURNING {LINE_COLUMNS}"
        ))
        .bind(line.as_uuid())
        .bind(entry)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_line_note", e))?;
        row.as_ref().map(line_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn FulfillmentTx + '_>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl FulfillmentTx for PostgresTx {
    #[instrument(
        skip(self),
        fields(sales_order = %id, line_count = tracing::field::Empty),
        err
    )]
    async fn order_for_update(
        &mut self,
        id: SalesOrderId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        let row = sqlx::query("SELECT id, reference, customer, status FROM sales_orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order_for_update", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let line_rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM sales_order_lines \
             WHERE order_id = $1 ORDER BY line_no FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_order_lines", e))?;
        let lines = line_rows
            .iter()
            .map(line_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Span::current().record("line_count", lines.len());
        order_from_row(&row, lines).map(Some)
    }

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM sales_order_lines WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("tx_line_item", e))?;
        row.as_ref().map(line_from_row).transpose()
    }

    async fn stock_item(&mut self, id: StockItemId) -> Result<Option<StockItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("tx_stock_item", e))?;
        row.as_ref().map(stock_from_row).transpose()
    }

    async fn allocated_on_line(&mut self, line: LineItemId) -> Result<Decimal, StoreError> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM sales_order_allocations WHERE line_id = $1",
        )
        .bind(line.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("allocated_on_line", e))?;
        Ok(total)
    }

    #[instrument(
        skip(self, plan),
        fields(
            line_item = %plan.line_id,
            stock_item = %plan.stock_item_id,
            fulfill = %plan.fulfill,
            created = tracing::field::Empty
        ),
        err
    )]
    async fn upsert_allocation(
        &mut self,
        plan: &AllocationPlan,
    ) -> Result<(Allocation, bool), StoreError> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO sales_order_allocations \
                 (id, line_id, stock_item_id, quantity, created_at, updated_at) \
             VALUES ($1, $2, $3, GREATEST(LEAST($4, $5), 0), $6, $6) \
             ON CONFLICT (line_id, stock_item_id) DO UPDATE SET \
                 quantity = GREATEST(LEAST(sales_order_allocations.quantity + $4, $5), 0), \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {ALLOCATION_COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(AllocationId::new().as_uuid())
        .bind(plan.line_id.as_uuid())
        .bind(plan.stock_item_id.as_uuid())
        .bind(plan.fulfill)
        .bind(plan.cap)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Busy(format!(
                    "concurrent allocation insert for line {}",
                    plan.line_id
                ))
            } else {
                map_sqlx_error("upsert_allocation", e)
            }
        })?;

        let inserted: bool = row
            .try_get("inserted")
            .map_err(|e| map_sqlx_error("upsert_allocation", e))?;
        Span::current().record("created", inserted);
        Ok((allocation_from_row(&row)?, inserted))
    }

    async fn set_line_part(&mut self, line: LineItemId, part: PartId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sales_order_lines SET part_id = $2 WHERE id = $1")
            .bind(line.as_uuid())
            .bind(part.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_line_part", e))?;
        if result.rows_affected() != 1 {
            return Err(StoreError::Database(format!("line item {line} vanished")));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40001") | Some("40P01") => StoreError::Busy(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Busy(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("undecodable row in {}: {}", operation, err))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {err}"))
}

fn part_from_row(row: &PgRow) -> Result<Part, StoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("part_row", e))?;
    let name: String = row.try_get("name").map_err(|e| map_sqlx_error("part_row", e))?;
    let ipn: Option<String> = row.try_get("ipn").map_err(|e| map_sqlx_error("part_row", e))?;
    Part::new(PartId::from_uuid(id), name, ipn).map_err(|e| corrupt("part", e))
}

fn stock_from_row(row: &PgRow) -> Result<StockItem, StoreError> {
    let get = |e| map_sqlx_error("stock_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    let part_id: Uuid = row.try_get("part_id").map_err(get)?;
    let quantity: Decimal = row.try_get("quantity").map_err(get)?;
    let in_stock: bool = row.try_get("in_stock").map_err(get)?;
    let barcode_hash: Option<String> = row.try_get("barcode_hash").map_err(get)?;
    let location: Option<String> = row.try_get("location").map_err(get)?;

    let mut item = StockItem::new(
        StockItemId::from_uuid(id),
        PartId::from_uuid(part_id),
        quantity,
    )
    .with_in_stock(in_stock);
    if let Some(hash) = barcode_hash {
        item = item.with_barcode_hash(hash);
    }
    if let Some(location) = location {
        item = item.with_location(location);
    }
    Ok(item)
}

fn line_from_row(row: &PgRow) -> Result<LineItem, StoreError> {
    let get = |e| map_sqlx_error("line_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    let order_id: Uuid = row.try_get("order_id").map_err(get)?;
    let line_no: i32 = row.try_get("line_no").map_err(get)?;
    let part_id: Uuid = row.try_get("part_id").map_err(get)?;
    let quantity: Decimal = row.try_get("quantity").map_err(get)?;
    let shipped: Decimal = row.try_get("shipped").map_err(get)?;
    let notes: String = row.try_get("notes").map_err(get)?;

    let line_no = u32::try_from(line_no).map_err(|e| corrupt("line_no", e))?;
    LineItem::new(
        LineItemId::from_uuid(id),
        SalesOrderId::from_uuid(order_id),
        line_no,
        PartId::from_uuid(part_id),
        quantity,
        shipped,
    )
    .map(|l| l.with_notes(notes))
    .map_err(|e| corrupt("line item", e))
}

fn order_from_row(row: &PgRow, lines: Vec<LineItem>) -> Result<SalesOrder, StoreError> {
    let get = |e| map_sqlx_error("order_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    let reference: String = row.try_get("reference").map_err(get)?;
    let customer: Option<String> = row.try_get("customer").map_err(get)?;
    let status: String = row.try_get("status").map_err(get)?;

    let status: SalesOrderStatus = status.parse().map_err(|e| corrupt("order status", e))?;
    SalesOrder::from_parts(SalesOrderId::from_uuid(id), reference, customer, status, lines)
        .map_err(|e| corrupt("sales order", e))
}

fn allocation_from_row(row: &PgRow) -> Result<Allocation, StoreError> {
    let get = |e| map_sqlx_error("allocation_row", e);
    let id: Uuid = row.try_get("id").map_err(get)?;
    let line_id: Uuid = row.try_get("line_id").map_err(get)?;
    let stock_item_id: Uuid = row.try_get("stock_item_id").map_err(get)?;
    let quantity: Decimal = row.try_get("quantity").map_err(get)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(get)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(get)?;

    Allocation::restore(
        AllocationId::from_uuid(id),
        LineItemId::from_uuid(line_id),
        StockItemId::from_uuid(stock_item_id),
        quantity,
        created_at,
        updated_at,
    )
    .map_err(|e| corrupt("allocation", e))
}
