//! Fulfillment outcome taxonomy.

use rust_decimal::Decimal;
use thiserror::Error;

use stockroom_core::{LineItemId, PartId, SalesOrderId, StockItemId};
use stockroom_sales::SalesOrderStatus;

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

/// Every way a scan or an unavailability mark can fail.
///
/// Business-rule variants are user-actionable and carry enough context for the
/// caller to decide what to resubmit. `Conflict` is retryable. `Unexpected` holds
/// internal detail that is logged but never shown to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FulfillmentError {
    #[error("no stock item found for barcode")]
    NotFound { barcode: String },

    #[error("stock item is not available")]
    Unavailable {
        stock_item: StockItemId,
        quantity: Decimal,
    },

    #[error("scanned item does not match any open line item in this order")]
    NoMatch {
        stock_item: StockItemId,
        part: PartId,
        override_part: Option<PartId>,
        /// The caller may retry with a substitute part.
        suggest_override: bool,
    },

    #[error("substitution requires confirmation")]
    RequiresConfirmation {
        original_part: PartId,
        override_part: PartId,
    },

    #[error("line item does not belong to this sales order")]
    OwnershipMismatch {
        line_item: LineItemId,
        sales_order: SalesOrderId,
    },

    #[error("line item is already fully fulfilled")]
    AlreadyFulfilled {
        line_item: LineItemId,
        /// `true` when shipped == ordered, `false` when existing allocations already
        /// cover the outstanding quantity.
        fully_shipped: bool,
    },

    #[error("sales order is {status} and cannot be fulfilled")]
    OrderClosed {
        sales_order: SalesOrderId,
        status: SalesOrderStatus,
    },

    #[error("sales order not found")]
    OrderNotFound(SalesOrderId),

    #[error("line item not found")]
    LineNotFound(LineItemId),

    #[error("part not found")]
    PartNotFound(PartId),

    #[error("concurrent update in progress, retry the request")]
    Conflict(String),

    #[error("unexpected fulfillment failure")]
    Unexpected(String),
}

impl FulfillmentError {
    /// Stable reason code for responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            FulfillmentError::NotFound { .. } => "not_found",
            FulfillmentError::Unavailable { .. } => "unavailable",
            FulfillmentError::NoMatch { .. } => "no_match",
            FulfillmentError::RequiresConfirmation { .. } => "requires_confirmation",
            FulfillmentError::OwnershipMismatch { .. } => "ownership_mismatch",
            FulfillmentError::AlreadyFulfilled { .. } => "already_fulfilled",
            FulfillmentError::OrderClosed { .. } => "order_closed",
            FulfillmentError::OrderNotFound(_) => "order_not_found",
            FulfillmentError::LineNotFound(_) => "line_not_found",
            FulfillmentError::PartNotFound(_) => "part_not_found",
            FulfillmentError::Conflict(_) => "conflict",
            FulfillmentError::Unexpected(_) => "unexpected",
        }
    }

    /// Deterministic business-rule rejection (as opposed to infrastructure trouble).
    pub fn is_business_rule(&self) -> bool {
        !matches!(
            self,
            FulfillmentError::Conflict(_) | FulfillmentError::Unexpected(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FulfillmentError::Conflict(_))
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
