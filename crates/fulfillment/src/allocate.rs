//! Allocation accumulator.
//!
//! Computes how much of a scanned stock item can go toward a line. The store applies
//! the plan as one conditional upsert keyed by `(line, stock item)`.

use rust_decimal::Decimal;

use stockroom_core::{Entity, LineItemId, StockItemId};
use stockroom_inventory::StockItem;
use stockroom_sales::{LineItem, SalesOrder, accumulated_quantity};

use crate::error::{FulfillmentError, FulfillmentResult};

/// Quantities for one allocation upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPlan {
    pub line_id: LineItemId,
    pub stock_item_id: StockItemId,
    /// Quantity contributed by this scan.
    pub fulfill: Decimal,
    /// Ordered minus shipped; no allocation for the line may exceed it.
    pub cap: Decimal,
}

impl AllocationPlan {
    /// Resulting allocation quantity given the quantity already held by the
    /// `(line, stock item)` allocation (zero when none exists yet).
    pub fn apply_to(&self, existing: Decimal) -> Decimal {
        accumulated_quantity(existing, self.fulfill, self.cap)
    }
}

/// Plan an allocation of `unit` against `line`.
///
/// `allocated_on_line` is the sum of every existing allocation for the line, read
/// under the same lock as the line itself.
///
/// Checks, in order: the line belongs to `order`, the unit is available, the line
/// still has unshipped quantity, and that quantity is not already fully allocated.
pub fn plan_allocation(
    order: &SalesOrder,
    line: &LineItem,
    unit: &StockItem,
    allocated_on_line: Decimal,
) -> FulfillmentResult<AllocationPlan> {
    if line.order_id() != order.id() {
        return Err(FulfillmentError::OwnershipMismatch {
            line_item: line.id(),
            sales_order: order.id(),
        });
    }

    if !unit.is_available() {
        return Err(FulfillmentError::Unavailable {
            stock_item: unit.id(),
            quantity: unit.quantity(),
        });
    }

    let remaining = line.remaining();
    if remaining <= Decimal::ZERO {
        return Err(FulfillmentError::AlreadyFulfilled {
            line_item: line.id(),
            fully_shipped: true,
        });
    }

    let unallocated = remaining - allocated_on_line.max(Decimal::ZERO);
    let fulfill = unit.quantity().min(unallocated);
    if fulfill <= Decimal::ZERO {
        return Err(FulfillmentError::AlreadyFulfilled {
            line_item: line.id(),
            fully_shipped: false,
        });
    }

    Ok(AllocationPlan {
        line_id: line.id(),
        stock_item_id: unit.id(),
        fulfill,
        cap: remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use stockroom_core::{PartId, SalesOrderId};
    use stockroom_sales::SalesOrderStatus;

    fn order_with_line(ordered: Decimal, shipped: Decimal) -> (SalesOrder, LineItemId, PartId) {
        let part = PartId::new();
        let mut order =
            SalesOrder::new(SalesOrderId::new(), "SO-1", None, SalesOrderStatus::Pending);
        let line = order.add_line(part, ordered, shipped).unwrap();
        (order, line, part)
    }

    #[test]
    fn fulfill_is_min_of_unit_and_remaining() {
        let (order, line, part) = order_with_line(dec!(10), dec!(3));
        let unit = StockItem::new(StockItemId::new(), part, dec!(20));
        let plan = plan_allocation(&order, order.line(line).unwrap(), &unit, dec!(0)).unwrap();
        assert_eq!(plan.fulfill, dec!(7));
        assert_eq!(plan.cap, dec!(7));
    }

    #[test]
    fn zero_quantity_unit_is_unavailable() {
        let (order, line, part) = order_with_line(dec!(10), dec!(0));
        let unit = StockItem::new(StockItemId::new(), part, dec!(0));
        let err = plan_allocation(&order, order.line(line).unwrap(), &unit, dec!(0)).unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::Unavailable {
                stock_item: unit.id(),
                quantity: dec!(0)
            }
        );
    }

    #[test]
    fn not_in_stock_unit_is_unavailable() {
        let (order, line, part) = order_with_line(dec!(10), dec!(0));
        let unit = StockItem::new(StockItemId::new(), part, dec!(4)).with_in_stock(false);
        let err = plan_allocation(&order, order.line(line).unwrap(), &unit, dec!(0)).unwrap_err();
        assert_eq!(err.code(), "unavailable");
    }

    #[test]
    fn line_of_another_order_is_ownership_mismatch() {
        let (order, _, _) = order_with_line(dec!(10), dec!(0));
        let (other, other_line, part) = order_with_line(dec!(10), dec!(0));
        let unit = StockItem::new(StockItemId::new(), part, dec!(4));
        let err =
            plan_allocation(&order, other.line(other_line).unwrap(), &unit, dec!(0)).unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::OwnershipMismatch {
                line_item: other_line,
                sales_order: order.id()
            }
        );
    }

    #[test]
    fn fully_shipped_line_is_already_fulfilled() {
        let (order, line, part) = order_with_line(dec!(10), dec!(10));
        let unit = StockItem::new(StockItemId::new(), part, dec!(4));
        let err = plan_allocation(&order, order.line(line).unwrap(), &unit, dec!(0)).unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::AlreadyFulfilled {
                line_item: line,
                fully_shipped: true
            }
        );
    }

    #[test]
    fn fully_allocated_line_is_already_fulfilled() {
        let (order, line, part) = order_with_line(dec!(10), dec!(0));
        let unit = StockItem::new(StockItemId::new(), part, dec!(4));
        let err =
            plan_allocation(&order, order.line(line).unwrap(), &unit, dec!(10)).unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::AlreadyFulfilled {
                fully_shipped: false,
                ..
            }
        ));
    }

    /// Replays the 10-unit walkthrough: 4, then the same unit again, then a unit of 5.
    #[test]
    fn repeated_scans_accumulate_and_cap() {
        let (order, line_id, part) = order_with_line(dec!(10), dec!(0));
        let line = order.line(line_id).unwrap();
        let a = StockItem::new(StockItemId::new(), part, dec!(4));
        let b = StockItem::new(StockItemId::new(), part, dec!(5));

        let mut rows: HashMap<StockItemId, Decimal> = HashMap::new();
        let mut scan = |unit: &StockItem| {
            let total: Decimal = rows.values().copied().sum();
            let plan = plan_allocation(&order, line, unit, total).unwrap();
            let existing = rows.get(&unit.id()).copied().unwrap_or_default();
            rows.insert(unit.id(), plan.apply_to(existing));
            rows.values().copied().sum::<Decimal>()
        };

        assert_eq!(scan(&a), dec!(4));
        assert_eq!(scan(&a), dec!(8));
        assert_eq!(scan(&b), dec!(10));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[&b.id()], dec!(2));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of scans over a handful of stock items, the sum
        /// of a line's allocations never exceeds ordered minus shipped.
        #[test]
        fn allocations_never_exceed_outstanding_quantity(
            ordered in 1i64..100,
            shipped_pct in 0i64..=100,
            unit_qtys in prop::collection::vec(0i64..40, 1..5),
            scans in prop::collection::vec(0usize..5, 1..30),
        ) {
            let ordered = Decimal::from(ordered);
            let shipped = (ordered * Decimal::from(shipped_pct) / dec!(100)).floor();
            let (order, line_id, part) = order_with_line(ordered, shipped);
            let line = order.line(line_id).unwrap();
            let units: Vec<StockItem> = unit_qtys
                .iter()
                .map(|q| StockItem::new(StockItemId::new(), part, Decimal::from(*q)))
                .collect();

            let mut rows: HashMap<StockItemId, Decimal> = HashMap::new();
            for idx in scans {
                let unit = &units[idx % units.len()];
                let total: Decimal = rows.values().copied().sum();
                if let Ok(plan) = plan_allocation(&order, line, unit, total) {
                    let existing = rows.get(&unit.id()).copied().unwrap_or_default();
                    rows.insert(unit.id(), plan.apply_to(existing));
                }
                let total: Decimal = rows.values().copied().sum();
                prop_assert!(total <= ordered - shipped);
                prop_assert!(rows.len() <= units.len());
            }
        }
    }
}
