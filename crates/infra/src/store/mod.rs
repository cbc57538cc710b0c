//! Fulfillment persistence boundary.
//!
//! `FulfillmentStore` covers reads and single-record updates. Everything a scan writes
//! goes through a `FulfillmentTx`, which either commits as a whole or not at all.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryFulfillmentStore;
pub use postgres::PostgresFulfillmentStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

use stockroom_core::{LineItemId, PartId, SalesOrderId, StockItemId};
use stockroom_fulfillment::{AllocationPlan, FulfillmentError, StockLookup};
use stockroom_inventory::{Part, StockItem};
use stockroom_sales::{Allocation, LineItem, SalesOrder};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lock or serialization contention; the whole unit of work may be retried.
    #[error("store busy: {0}")]
    Busy(String),

    #[error("database error: {0}")]
    Database(String),

    /// A stored row failed domain validation on the way out.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for FulfillmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Busy(msg) => FulfillmentError::Conflict(msg),
            other => FulfillmentError::Unexpected(other.to_string()),
        }
    }
}

#[async_trait]
pub trait FulfillmentStore: StockLookup<Error = StoreError> {
    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError>;

    /// Order with all of its lines, sorted by `line_no`.
    async fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError>;

    async fn line_item(&self, id: LineItemId) -> Result<Option<LineItem>, StoreError>;

    async fn allocations_for_order(&self, id: SalesOrderId)
    -> Result<Vec<Allocation>, StoreError>;

    /// Orders in an open status, with lines.
    async fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError>;

    /// Append `entry` to the line's notes in one atomic update. `None` when the line
    /// does not exist.
    async fn append_line_note(
        &self,
        line: LineItemId,
        entry: &str,
    ) -> Result<Option<LineItem>, StoreError>;

    /// Start a unit of work. Fails with `Busy` when the store cannot be locked within
    /// its lock timeout.
    async fn begin(&self) -> Result<Box<dyn FulfillmentTx + '_>, StoreError>;
}

/// One isolated unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait FulfillmentTx: Send {
    /// Load the order and lock its lines for the rest of the transaction.
    async fn order_for_update(
        &mut self,
        id: SalesOrderId,
    ) -> Result<Option<SalesOrder>, StoreError>;

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>, StoreError>;

    async fn stock_item(&mut self, id: StockItemId) -> Result<Option<StockItem>, StoreError>;

    /// Sum of every allocation held against `line`.
    async fn allocated_on_line(&mut self, line: LineItemId) -> Result<Decimal, StoreError>;

    /// Create the `(line, stock item)` allocation with `plan.fulfill`, or grow the
    /// existing one to `min(existing + fulfill, cap)`. The flag is `true` on create.
    async fn upsert_allocation(
        &mut self,
        plan: &AllocationPlan,
    ) -> Result<(Allocation, bool), StoreError>;

    async fn set_line_part(&mut self, line: LineItemId, part: PartId) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> FulfillmentStore for Arc<S>
where
    S: FulfillmentStore + ?Sized,
{
    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError> {
        (**self).part(id).await
    }

    async fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
        (**self).sales_order(id).await
    }

    async fn line_item(&self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        (**self).line_item(id).await
    }

    async fn allocations_for_order(
        &self,
        id: SalesOrderId,
    ) -> Result<Vec<Allocation>, StoreError> {
        (**self).allocations_for_order(id).await
    }

    async fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        (**self).open_orders().await
    }

    async fn append_line_note(
        &self,
        line: LineItemId,
        entry: &str,
    ) -> Result<Option<LineItem>, StoreError> {
        (**self).append_line_note(line, entry).await
    }

    async fn begin(&self) -> Result<Box<dyn FulfillmentTx + '_>, StoreError> {
        (**self).begin().await
    }
}
