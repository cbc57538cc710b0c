//! Fulfillment pipeline (application-level orchestration).
//!
//! ```text
//! ScanRequest
//!   ↓
//! 1. Resolve barcode (read-only, outside any transaction)
//!   ↓
//! 2. Begin unit of work, lock the order's lines
//!   ↓
//! 3. Match line item, pass the substitution gate
//!   ↓
//! 4. Plan and upsert the allocation, re-point a substituted line
//!   ↓
//! 5. Commit (any failure in 2-4 rolls everything back)
//! ```

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{Span, instrument};

use stockroom_core::{Entity, LineItemId, SalesOrderId};
use stockroom_fulfillment::{
    BarcodeHasher, BarcodeResolver, FulfillmentError, FulfillmentResult, LineCoverage,
    MarkUnavailableRequest, ScanOutcome, ScanRequest, ScanState, ScanStep, Sha256BarcodeHasher,
    match_line, plan_allocation, unavailable_entry,
};
use stockroom_inventory::StockItem;
use stockroom_sales::{LineItem, SalesOrder};

use crate::store::{FulfillmentStore, FulfillmentTx};

/// An order together with how much is allocated against each of its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetail {
    pub order: SalesOrder,
    allocated: HashMap<LineItemId, Decimal>,
}

impl OrderDetail {
    pub fn allocated_on(&self, line: LineItemId) -> Decimal {
        self.allocated.get(&line).copied().unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct FulfillmentService<S, H = Sha256BarcodeHasher> {
    store: S,
    resolver: BarcodeResolver<H>,
}

impl<S> FulfillmentService<S> {
    pub fn new(store: S) -> Self {
        Self::with_hasher(store, Sha256BarcodeHasher)
    }
}

impl<S, H> FulfillmentService<S, H> {
    pub fn with_hasher(store: S, hasher: H) -> Self
    where
        H: BarcodeHasher,
    {
        Self {
            store,
            resolver: BarcodeResolver::new(hasher),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, H> FulfillmentService<S, H>
where
    S: FulfillmentStore,
    H: BarcodeHasher,
{
    /// Turn one scan into an allocation.
    ///
    /// An unknown barcode fails before any transaction is opened. Every other failure
    /// leaves the store exactly as it was.
    #[instrument(
        skip(self, request),
        fields(sales_order = %request.sales_order, state = tracing::field::Empty)
    )]
    pub async fn scan(&self, request: &ScanRequest) -> FulfillmentResult<ScanOutcome> {
        let mut state = ScanState::ResolvingBarcode;
        let result = self.run_scan(request, &mut state).await;

        let state = match &result {
            Ok(_) => state,
            Err(err) => state.advance(ScanStep::from_error(err)).unwrap_or(state),
        };
        Span::current().record("state", tracing::field::display(state));

        match &result {
            Ok(outcome) => tracing::info!(
                stock_item = %outcome.stock_item,
                line_item = %outcome.line_item,
                allocation_quantity = %outcome.allocation_quantity,
                line_allocated = %outcome.line_allocated,
                created = outcome.allocation_created,
                substitution = outcome.substitution_made,
                "scan allocated"
            ),
            Err(FulfillmentError::Conflict(msg)) => {
                tracing::warn!(reason = %msg, "scan hit a concurrent update")
            }
            Err(FulfillmentError::Unexpected(detail)) => {
                tracing::error!(detail = %detail, "scan failed unexpectedly")
            }
            Err(err) => tracing::info!(code = err.code(), "scan rejected"),
        }
        result
    }

    async fn run_scan(
        &self,
        request: &ScanRequest,
        state: &mut ScanState,
    ) -> FulfillmentResult<ScanOutcome> {
        let resolution = self
            .resolver
            .resolve(&self.store, &request.barcode)
            .await?;
        tracing::debug!(step = resolution.step(), "barcode resolution finished");
        let unit = resolution
            .into_stock_item()
            .ok_or_else(|| FulfillmentError::NotFound {
                barcode: request.barcode.clone(),
            })?;

        if let Some(part) = request.override_part {
            if self.store.part(part).await?.is_none() {
                return Err(FulfillmentError::PartNotFound(part));
            }
        }
        *state = state.advance(ScanStep::Resolved)?;

        let mut tx = self.store.begin().await?;
        match allocate_in_tx(tx.as_mut(), request, unit, state).await {
            Ok(outcome) => {
                tx.commit().await?;
                *state = state.advance(ScanStep::Allocated)?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback after failed scan failed");
                }
                Err(err)
            }
        }
    }

    /// Record that a line's part could not be found on the shelf.
    #[instrument(skip(self, request), fields(line_item = %request.line_item))]
    pub async fn mark_unavailable(
        &self,
        request: &MarkUnavailableRequest,
    ) -> FulfillmentResult<LineItem> {
        let entry = unavailable_entry(request.notes.as_deref());
        let line = self
            .store
            .append_line_note(request.line_item, &entry)
            .await?
            .ok_or(FulfillmentError::LineNotFound(request.line_item))?;
        tracing::info!(sales_order = %line.order_id(), "line marked unavailable");
        Ok(line)
    }

    /// Open orders with at least one line left to ship, sorted by reference.
    #[instrument(skip(self), err(Display))]
    pub async fn open_orders(&self) -> FulfillmentResult<Vec<SalesOrder>> {
        let mut orders: Vec<SalesOrder> = self
            .store
            .open_orders()
            .await?
            .into_iter()
            .filter(SalesOrder::needs_fulfillment)
            .collect();
        orders.sort_by(|a, b| a.reference().cmp(b.reference()));
        Ok(orders)
    }

    #[instrument(skip(self), fields(sales_order = %id))]
    pub async fn order_detail(&self, id: SalesOrderId) -> FulfillmentResult<OrderDetail> {
        let order = self
            .store
            .sales_order(id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(id))?;

        let mut allocated: HashMap<LineItemId, Decimal> = HashMap::new();
        for allocation in self.store.allocations_for_order(id).await? {
            *allocated.entry(allocation.line_id()).or_default() += allocation.quantity();
        }
        Ok(OrderDetail { order, allocated })
    }
}

async fn allocate_in_tx<T>(
    tx: &mut T,
    request: &ScanRequest,
    resolved: StockItem,
    state: &mut ScanState,
) -> FulfillmentResult<ScanOutcome>
where
    T: FulfillmentTx + ?Sized,
{
    let order = tx
        .order_for_update(request.sales_order)
        .await?
        .ok_or(FulfillmentError::OrderNotFound(request.sales_order))?;
    if !order.is_open() {
        return Err(FulfillmentError::OrderClosed {
            sales_order: order.id(),
            status: order.status(),
        });
    }

    // Availability may have changed since resolution; trust the locked read.
    let unit = tx
        .stock_item(resolved.id())
        .await?
        .ok_or_else(|| FulfillmentError::NotFound {
            barcode: request.barcode.clone(),
        })?;
    if !unit.is_available() {
        return Err(FulfillmentError::Unavailable {
            stock_item: unit.id(),
            quantity: unit.quantity(),
        });
    }

    let explicit = match request.line_item {
        Some(id) => match order.line(id) {
            Some(line) => Some(line),
            None => {
                return Err(match tx.line_item(id).await? {
                    Some(_) => FulfillmentError::OwnershipMismatch {
                        line_item: id,
                        sales_order: order.id(),
                    },
                    None => FulfillmentError::LineNotFound(id),
                });
            }
        },
        None => None,
    };

    let mut coverage = LineCoverage::new();
    for open in order.lines().iter().filter(|l| l.is_open()) {
        coverage.record(open.id(), tx.allocated_on_line(open.id()).await?);
    }

    let matched = match_line(&order, &unit, explicit, request.substitution(), &coverage)?;
    *state = state.advance(ScanStep::Matched)?;

    let line = matched.line;
    let plan = plan_allocation(&order, line, &unit, coverage.allocated_on(line.id()))?;
    let (allocation, created) = tx.upsert_allocation(&plan).await?;
    if let Some(part) = matched.repoint_to() {
        tx.set_line_part(line.id(), part).await?;
    }
    let line_allocated = tx.allocated_on_line(line.id()).await?;

    Ok(ScanOutcome {
        stock_item: unit.id(),
        line_item: line.id(),
        allocation_quantity: allocation.quantity(),
        line_allocated,
        allocation_created: created,
        substitution_made: matched.substitution_made(),
    })
}
