//! Scan request/outcome types and the per-scan state machine.
//!
//! ```text
//! ResolvingBarcode ─▶ MatchingLine ─┬─▶ Allocating ─▶ Completed
//!                                   ├─▶ AwaitingConfirmation
//!                                   └─▶ Rejected
//! ```
//!
//! Any non-terminal state may also move to `Rejected`. Nothing retries on its own:
//! `AwaitingConfirmation` ends the request and the operator resubmits.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{LineItemId, PartId, SalesOrderId, StockItemId};

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::substitution::SubstitutionRequest;

/// One barcode scan against a sales order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub barcode: String,
    pub sales_order: SalesOrderId,
    #[serde(default)]
    pub line_item: Option<LineItemId>,
    #[serde(default)]
    pub override_part: Option<PartId>,
    #[serde(default)]
    pub confirm_substitution: bool,
}

impl ScanRequest {
    pub fn new(barcode: impl Into<String>, sales_order: SalesOrderId) -> Self {
        Self {
            barcode: barcode.into(),
            sales_order,
            line_item: None,
            override_part: None,
            confirm_substitution: false,
        }
    }

    pub fn with_line_item(mut self, line_item: LineItemId) -> Self {
        self.line_item = Some(line_item);
        self
    }

    pub fn with_override(mut self, part: PartId, confirmed: bool) -> Self {
        self.override_part = Some(part);
        self.confirm_substitution = confirmed;
        self
    }

    pub fn substitution(&self) -> Option<SubstitutionRequest> {
        self.override_part
            .map(|part| SubstitutionRequest::new(part, self.confirm_substitution))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkUnavailableRequest {
    pub line_item: LineItemId,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Result of a successful scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub stock_item: StockItemId,
    pub line_item: LineItemId,
    /// Quantity of the `(line, stock item)` allocation after this scan.
    pub allocation_quantity: Decimal,
    /// Sum of every allocation on the line after this scan.
    pub line_allocated: Decimal,
    pub allocation_created: bool,
    pub substitution_made: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    ResolvingBarcode,
    MatchingLine,
    Allocating,
    AwaitingConfirmation,
    Rejected(&'static str),
    Completed,
}

/// Event moving a scan from one state to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Resolved,
    Matched,
    ConfirmationRequired,
    Allocated,
    Failed(&'static str),
}

impl ScanStep {
    /// The step a failure represents: an unconfirmed substitution parks the scan,
    /// everything else rejects it.
    pub fn from_error(err: &FulfillmentError) -> Self {
        match err {
            FulfillmentError::RequiresConfirmation { .. } => ScanStep::ConfirmationRequired,
            other => ScanStep::Failed(other.code()),
        }
    }
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::AwaitingConfirmation | ScanState::Rejected(_) | ScanState::Completed
        )
    }

    pub fn advance(self, step: ScanStep) -> FulfillmentResult<ScanState> {
        use ScanState::*;
        use ScanStep::*;

        match (self, step) {
            (ResolvingBarcode, Resolved) => Ok(MatchingLine),
            (MatchingLine, Matched) => Ok(Allocating),
            (MatchingLine, ConfirmationRequired) => Ok(AwaitingConfirmation),
            (Allocating, Allocated) => Ok(Completed),
            (state, Failed(code)) if !state.is_terminal() => Ok(Rejected(code)),
            (state, step) => Err(FulfillmentError::unexpected(format!(
                "invalid scan transition: {state} on {step:?}"
            ))),
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::ResolvingBarcode => f.write_str("resolving_barcode"),
            ScanState::MatchingLine => f.write_str("matching_line"),
            ScanState::Allocating => f.write_str("allocating"),
            ScanState::AwaitingConfirmation => f.write_str("awaiting_confirmation"),
            ScanState::Rejected(code) => write!(f, "rejected({code})"),
            ScanState::Completed => f.write_str("completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_completed() {
        let state = ScanState::ResolvingBarcode
            .advance(ScanStep::Resolved)
            .and_then(|s| s.advance(ScanStep::Matched))
            .and_then(|s| s.advance(ScanStep::Allocated))
            .unwrap();
        assert_eq!(state, ScanState::Completed);
        assert!(state.is_terminal());
    }

    #[test]
    fn confirmation_is_only_reachable_from_matching() {
        assert_eq!(
            ScanState::MatchingLine
                .advance(ScanStep::ConfirmationRequired)
                .unwrap(),
            ScanState::AwaitingConfirmation
        );
        assert!(
            ScanState::Allocating
                .advance(ScanStep::ConfirmationRequired)
                .is_err()
        );
    }

    #[test]
    fn failures_reject_any_live_state_but_not_terminal_ones() {
        for state in [
            ScanState::ResolvingBarcode,
            ScanState::MatchingLine,
            ScanState::Allocating,
        ] {
            assert_eq!(
                state.advance(ScanStep::Failed("no_match")).unwrap(),
                ScanState::Rejected("no_match")
            );
        }
        assert!(
            ScanState::Completed
                .advance(ScanStep::Failed("conflict"))
                .is_err()
        );
    }

    #[test]
    fn step_from_error() {
        let err = FulfillmentError::RequiresConfirmation {
            original_part: PartId::new(),
            override_part: PartId::new(),
        };
        assert_eq!(ScanStep::from_error(&err), ScanStep::ConfirmationRequired);
        assert_eq!(
            ScanStep::from_error(&FulfillmentError::conflict("busy")),
            ScanStep::Failed("conflict")
        );
    }

    #[test]
    fn request_deserializes_with_optional_fields_missing() {
        let order = SalesOrderId::new();
        let json = format!(r#"{{"barcode": "X1", "sales_order": "{order}"}}"#);
        let req: ScanRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, ScanRequest::new("X1", order));
        assert_eq!(req.substitution(), None);
    }

    #[test]
    fn substitution_carries_confirmation_flag() {
        let part = PartId::new();
        let req = ScanRequest::new("X1", SalesOrderId::new()).with_override(part, true);
        assert_eq!(req.substitution(), Some(SubstitutionRequest::new(part, true)));
    }
}
