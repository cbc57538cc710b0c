use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use stockroom_core::{AllocationId, Entity, LineItemId, PartId, SalesOrderId, StockItemId};
use stockroom_fulfillment::{AllocationPlan, StockLookup};
use stockroom_inventory::{Part, StockItem};
use stockroom_sales::{Allocation, LineItem, SalesOrder};

use super::{FulfillmentStore, FulfillmentTx, StoreError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct State {
    parts: HashMap<PartId, Part>,
    stock: HashMap<StockItemId, StockItem>,
    orders: HashMap<SalesOrderId, SalesOrder>,
    allocations: HashMap<(LineItemId, StockItemId), Allocation>,
}

impl State {
    fn line(&self, id: LineItemId) -> Option<&LineItem> {
        self.orders.values().find_map(|o| o.line(id))
    }

    fn line_mut(&mut self, id: LineItemId) -> Option<&mut LineItem> {
        self.orders.values_mut().find_map(|o| o.line_mut(id))
    }
}

/// In-memory fulfillment store.
///
/// Intended for tests/dev. A unit of work holds one exclusive lock over the whole
/// store and writes to a private copy that replaces the shared state on commit.
#[derive(Debug, Clone)]
pub struct InMemoryFulfillmentStore {
    state: Arc<Mutex<State>>,
    lock_timeout: Duration,
}

impl Default for InMemoryFulfillmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFulfillmentStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            lock_timeout,
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        tokio::time::timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| busy(self.lock_timeout))
    }

    pub async fn insert_part(&self, part: Part) -> Result<(), StoreError> {
        self.lock().await?.parts.insert(part.id(), part);
        Ok(())
    }

    pub async fn insert_stock(&self, item: StockItem) -> Result<(), StoreError> {
        let mut state = self.lock().await?;
        if let Some(hash) = item.barcode_hash() {
            let taken = state
                .stock
                .values()
                .any(|s| s.id() != item.id() && s.barcode_hash() == Some(hash));
            if taken {
                return Err(StoreError::Database(format!(
                    "barcode hash already assigned: {hash}"
                )));
            }
        }
        state.stock.insert(item.id(), item);
        Ok(())
    }

    pub async fn insert_order(&self, order: SalesOrder) -> Result<(), StoreError> {
        self.lock().await?.orders.insert(order.id(), order);
        Ok(())
    }
}

fn busy(timeout: Duration) -> StoreError {
    StoreError::Busy(format!(
        "could not lock store within {}ms",
        timeout.as_millis()
    ))
}

#[async_trait]
impl StockLookup for InMemoryFulfillmentStore {
    type Error = StoreError;

    async fn stock_by_barcode_hash(&self, hash: &str) -> Result<Option<StockItem>, StoreError> {
        let state = self.lock().await?;
        Ok(state
            .stock
            .values()
            .find(|s| s.barcode_hash() == Some(hash))
            .cloned())
    }

    async fn stock_by_id(&self, id: StockItemId) -> Result<Option<StockItem>, StoreError> {
        Ok(self.lock().await?.stock.get(&id).cloned())
    }
}

#[async_trait]
impl FulfillmentStore for InMemoryFulfillmentStore {
    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError> {
        Ok(self.lock().await?.parts.get(&id).cloned())
    }

    async fn sales_order(&self, id: SalesOrderId) -> Result<Option<SalesOrder>, StoreError> {
        Ok(self.lock().await?.orders.get(&id).cloned())
    }

    async fn line_item(&self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        Ok(self.lock().await?.line(id).cloned())
    }

    async fn allocations_for_order(
        &self,
        id: SalesOrderId,
    ) -> Result<Vec<Allocation>, StoreError> {
        let state = self.lock().await?;
        let Some(order) = state.orders.get(&id) else {
            return Ok(vec![]);
        };
        let mut out: Vec<Allocation> = state
            .allocations
            .values()
            .filter(|a| order.line(a.line_id()).is_some())
            .cloned()
            .collect();
        out.sort_by_key(|a| a.created_at());
        Ok(out)
    }

    async fn open_orders(&self) -> Result<Vec<SalesOrder>, StoreError> {
        let state = self.lock().await?;
        Ok(state
            .orders
            .values()
            .filter(|o| o.is_open())
            .cloned()
            .collect())
    }

    async fn append_line_note(
        &self,
        line: LineItemId,
        entry: &str,
    ) -> Result<Option<LineItem>, StoreError> {
        let mut state = self.lock().await?;
        Ok(state.line_mut(line).map(|l| {
            l.append_note(entry);
            l.clone()
        }))
    }

    async fn begin(&self) -> Result<Box<dyn FulfillmentTx + '_>, StoreError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| busy(self.lock_timeout))?;
        let work = guard.clone();
        Ok(Box::new(InMemoryTx { guard, work }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

#[async_trait]
impl FulfillmentTx for InMemoryTx {
    async fn order_for_update(
        &mut self,
        id: SalesOrderId,
    ) -> Result<Option<SalesOrder>, StoreError> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        Ok(self.work.line(id).cloned())
    }

    async fn stock_item(&mut self, id: StockItemId) -> Result<Option<StockItem>, StoreError> {
        Ok(self.work.stock.get(&id).cloned())
    }

    async fn allocated_on_line(&mut self, line: LineItemId) -> Result<Decimal, StoreError> {
        Ok(self
            .work
            .allocations
            .values()
            .filter(|a| a.line_id() == line)
            .map(|a| a.quantity())
            .sum())
    }

    async fn upsert_allocation(
        &mut self,
        plan: &AllocationPlan,
    ) -> Result<(Allocation, bool), StoreError> {
        let now = Utc::now();
        let key = (plan.line_id, plan.stock_item_id);
        if let Some(existing) = self.work.allocations.get_mut(&key) {
            existing.accumulate(plan.fulfill, plan.cap, now);
            return Ok((existing.clone(), false));
        }

        let created = Allocation::new(
            AllocationId::new(),
            plan.line_id,
            plan.stock_item_id,
            plan.apply_to(Decimal::ZERO),
            now,
        )
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.work.allocations.insert(key, created.clone());
        Ok((created, true))
    }

    async fn set_line_part(&mut self, line: LineItemId, part: PartId) -> Result<(), StoreError> {
        match self.work.line_mut(line) {
            Some(l) => {
                l.repoint_part(part);
                Ok(())
            }
            None => Err(StoreError::Database(format!("line item {line} vanished"))),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
