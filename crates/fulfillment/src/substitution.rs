//! Substitution gate.
//!
//! Fulfilling a line with a different part than it asks for must be explicitly
//! confirmed by the operator. Unconfirmed attempts never get past this module.

use serde::{Deserialize, Serialize};

use stockroom_core::{Entity, PartId};
use stockroom_inventory::StockItem;
use stockroom_sales::{LineItem, SalesOrder};

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::matcher::{LineCoverage, Pick, pick_open_line};

/// A request to fulfill using `override_part` instead of the scanned item's part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionRequest {
    pub override_part: PartId,
    pub confirmed: bool,
}

impl SubstitutionRequest {
    pub fn new(override_part: PartId, confirmed: bool) -> Self {
        Self {
            override_part,
            confirmed,
        }
    }

    /// Hard gate: `RequiresConfirmation` unless the request is confirmed.
    pub fn require_confirmation(&self, scanned_part: PartId) -> FulfillmentResult<()> {
        if self.confirmed {
            Ok(())
        } else {
            Err(FulfillmentError::RequiresConfirmation {
                original_part: scanned_part,
                override_part: self.override_part,
            })
        }
    }
}

/// Find the line a confirmed substitution should fulfill: the first open line (by
/// `line_no`) requiring the override part that still has unallocated quantity.
///
/// Open override lines that allocations already cover give `AlreadyFulfilled`; no
/// open override line at all is `NoMatch`.
pub fn confirm_substitution<'a>(
    order: &'a SalesOrder,
    scanned: &StockItem,
    request: SubstitutionRequest,
    coverage: &LineCoverage,
) -> FulfillmentResult<&'a LineItem> {
    request.require_confirmation(scanned.part_id())?;

    match pick_open_line(order, request.override_part, coverage) {
        Pick::Uncovered(line) => Ok(line),
        Pick::Covered(line) => Err(FulfillmentError::AlreadyFulfilled {
            line_item: line.id(),
            fully_shipped: false,
        }),
        Pick::None => Err(FulfillmentError::NoMatch {
            stock_item: scanned.id(),
            part: scanned.part_id(),
            override_part: Some(request.override_part),
            suggest_override: false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockroom_core::{SalesOrderId, StockItemId};
    use stockroom_sales::SalesOrderStatus;

    fn order_with(parts: &[(PartId, rust_decimal::Decimal)]) -> SalesOrder {
        let mut order =
            SalesOrder::new(SalesOrderId::new(), "SO-7", None, SalesOrderStatus::Pending);
        for (part, shipped) in parts {
            order.add_line(*part, dec!(5), *shipped).unwrap();
        }
        order
    }

    #[test]
    fn unconfirmed_request_always_requires_confirmation() {
        let sub = PartId::new();
        let order = order_with(&[(sub, dec!(0))]);
        let scanned = StockItem::new(StockItemId::new(), PartId::new(), dec!(1));

        let err = confirm_substitution(
            &order,
            &scanned,
            SubstitutionRequest::new(sub, false),
            &LineCoverage::new(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::RequiresConfirmation {
                original_part: scanned.part_id(),
                override_part: sub,
            }
        );
    }

    #[test]
    fn confirmed_request_picks_first_open_line_for_override_part() {
        let sub = PartId::new();
        let order = order_with(&[(sub, dec!(5)), (sub, dec!(2)), (sub, dec!(0))]);
        let scanned = StockItem::new(StockItemId::new(), PartId::new(), dec!(1));

        let line = confirm_substitution(
            &order,
            &scanned,
            SubstitutionRequest::new(sub, true),
            &LineCoverage::new(),
        )
        .unwrap();
        assert_eq!(line.line_no(), 2);
    }

    #[test]
    fn confirmed_request_without_open_line_is_no_match() {
        let sub = PartId::new();
        let order = order_with(&[(sub, dec!(5))]);
        let scanned = StockItem::new(StockItemId::new(), PartId::new(), dec!(1));

        let err = confirm_substitution(
            &order,
            &scanned,
            SubstitutionRequest::new(sub, true),
            &LineCoverage::new(),
        )
        .unwrap_err();
        match err {
            FulfillmentError::NoMatch {
                stock_item,
                override_part,
                suggest_override,
                ..
            } => {
                assert_eq!(stock_item, scanned.id());
                assert_eq!(override_part, Some(sub));
                assert!(!suggest_override);
            }
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn confirmed_request_skips_override_lines_already_covered() {
        let sub = PartId::new();
        let order = order_with(&[(sub, dec!(0)), (sub, dec!(0))]);
        let scanned = StockItem::new(StockItemId::new(), PartId::new(), dec!(1));
        let first = order.lines()[0].id();
        let second = order.lines()[1].id();
        let request = SubstitutionRequest::new(sub, true);

        let coverage: LineCoverage = [(first, dec!(5))].into_iter().collect();
        let line = confirm_substitution(&order, &scanned, request, &coverage).unwrap();
        assert_eq!(line.id(), second);

        let coverage: LineCoverage = [(first, dec!(5)), (second, dec!(5))].into_iter().collect();
        let err = confirm_substitution(&order, &scanned, request, &coverage).unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::AlreadyFulfilled {
                line_item: first,
                fully_shipped: false,
            }
        );
    }
}
