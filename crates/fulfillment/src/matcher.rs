//! Line-item matching.
//!
//! Picks the line a scanned stock item should be allocated against. Among the open
//! lines for a part, the lowest `line_no` that still has unallocated quantity wins.

use std::collections::HashMap;

use rust_decimal::Decimal;

use stockroom_core::{Entity, LineItemId, PartId};
use stockroom_inventory::StockItem;
use stockroom_sales::{LineItem, SalesOrder};

use crate::error::{FulfillmentError, FulfillmentResult};
use crate::substitution::{SubstitutionRequest, confirm_substitution};

/// Quantity already allocated against each line of an order, read under the same
/// lock as the order's lines. Lines without allocations count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineCoverage {
    allocated: HashMap<LineItemId, Decimal>,
}

impl LineCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: LineItemId, quantity: Decimal) {
        *self.allocated.entry(line).or_default() += quantity;
    }

    pub fn allocated_on(&self, line: LineItemId) -> Decimal {
        self.allocated.get(&line).copied().unwrap_or_default()
    }

    /// Unshipped quantity not yet covered by an allocation.
    pub fn unallocated(&self, line: &LineItem) -> Decimal {
        line.remaining() - self.allocated_on(line.id()).max(Decimal::ZERO)
    }
}

impl FromIterator<(LineItemId, Decimal)> for LineCoverage {
    fn from_iter<I: IntoIterator<Item = (LineItemId, Decimal)>>(iter: I) -> Self {
        let mut coverage = Self::new();
        for (line, quantity) in iter {
            coverage.record(line, quantity);
        }
        coverage
    }
}

/// Outcome of picking among the open lines for one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pick<'a> {
    /// Lowest `line_no` with unallocated quantity.
    Uncovered(&'a LineItem),
    /// Open lines exist but allocations already cover all of them; carries the first.
    Covered(&'a LineItem),
    None,
}

pub(crate) fn pick_open_line<'a>(
    order: &'a SalesOrder,
    part: PartId,
    coverage: &LineCoverage,
) -> Pick<'a> {
    let mut first = None;
    for line in order.open_lines_for_part(part) {
        if coverage.unallocated(line) > Decimal::ZERO {
            return Pick::Uncovered(line);
        }
        first.get_or_insert(line);
    }
    first.map_or(Pick::None, Pick::Covered)
}

/// The chosen line, plus the part it must be re-pointed to when the match came from
/// a confirmed substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedLine<'a> {
    pub line: &'a LineItem,
    pub substitute: Option<PartId>,
}

impl MatchedLine<'_> {
    pub fn substitution_made(&self) -> bool {
        self.substitute.is_some()
    }

    /// Part to write onto the line, if it differs from what the line holds now.
    pub fn repoint_to(&self) -> Option<PartId> {
        self.substitute.filter(|p| *p != self.line.part_id())
    }
}

/// Match a scanned stock item to a line.
///
/// - `explicit_line` is used as-is (ownership is checked when allocating). It still
///   goes through the substitution gate when an override is supplied, and a part
///   mismatch without an override is `NoMatch`.
/// - Otherwise the first open line for the scanned part with unallocated quantity
///   is used.
/// - With no such line, a substitution request is handed to the gate.
/// - Without one, lines for the scanned part that are fully allocated or fully
///   shipped give `AlreadyFulfilled`. Only an order with no line for the part at
///   all is `NoMatch`, which suggests supplying an override part.
pub fn match_line<'a>(
    order: &'a SalesOrder,
    scanned: &StockItem,
    explicit_line: Option<&'a LineItem>,
    substitution: Option<SubstitutionRequest>,
    coverage: &LineCoverage,
) -> FulfillmentResult<MatchedLine<'a>> {
    if let Some(line) = explicit_line {
        return match substitution {
            Some(request) => {
                request.require_confirmation(scanned.part_id())?;
                Ok(MatchedLine {
                    line,
                    substitute: Some(request.override_part),
                })
            }
            None if line.part_id() == scanned.part_id() => Ok(MatchedLine {
                line,
                substitute: None,
            }),
            None => Err(no_match(scanned)),
        };
    }

    let direct = pick_open_line(order, scanned.part_id(), coverage);
    if let Pick::Uncovered(line) = direct {
        return Ok(MatchedLine {
            line,
            substitute: None,
        });
    }

    if let Some(request) = substitution {
        let line = confirm_substitution(order, scanned, request, coverage)?;
        return Ok(MatchedLine {
            line,
            substitute: Some(request.override_part),
        });
    }

    match direct {
        Pick::Covered(line) => Err(FulfillmentError::AlreadyFulfilled {
            line_item: line.id(),
            fully_shipped: false,
        }),
        _ => match order
            .lines()
            .iter()
            .find(|l| l.part_id() == scanned.part_id())
        {
            Some(shipped) => Err(FulfillmentError::AlreadyFulfilled {
                line_item: shipped.id(),
                fully_shipped: true,
            }),
            None => Err(no_match(scanned)),
        },
    }
}

fn no_match(scanned: &StockItem) -> FulfillmentError {
    FulfillmentError::NoMatch {
        stock_item: scanned.id(),
        part: scanned.part_id(),
        override_part: None,
        suggest_override: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use stockroom_core::{SalesOrderId, StockItemId};
    use stockroom_sales::SalesOrderStatus;

    fn order() -> SalesOrder {
        SalesOrder::new(SalesOrderId::new(), "SO-1", None, SalesOrderStatus::InProgress)
    }

    fn stock(part: PartId, qty: Decimal) -> StockItem {
        StockItem::new(StockItemId::new(), part, qty)
    }

    fn none() -> LineCoverage {
        LineCoverage::new()
    }

    #[test]
    fn picks_lowest_line_no_among_open_lines_for_part() {
        let p = PartId::new();
        let mut o = order();
        o.add_line(PartId::new(), dec!(1), dec!(0)).unwrap();
        o.add_line(p, dec!(2), dec!(2)).unwrap();
        let want = o.add_line(p, dec!(2), dec!(0)).unwrap();
        o.add_line(p, dec!(2), dec!(0)).unwrap();

        let m = match_line(&o, &stock(p, dec!(1)), None, None, &none()).unwrap();
        assert_eq!(m.line.id(), want);
        assert!(!m.substitution_made());
    }

    #[test]
    fn direct_match_ignores_override() {
        let p = PartId::new();
        let mut o = order();
        let want = o.add_line(p, dec!(2), dec!(0)).unwrap();

        let req = SubstitutionRequest::new(PartId::new(), false);
        let m = match_line(&o, &stock(p, dec!(1)), None, Some(req), &none()).unwrap();
        assert_eq!(m.line.id(), want);
        assert!(!m.substitution_made());
    }

    #[test]
    fn no_line_and_no_override_suggests_override() {
        let mut o = order();
        o.add_line(PartId::new(), dec!(2), dec!(0)).unwrap();
        let err = match_line(&o, &stock(PartId::new(), dec!(1)), None, None, &none()).unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::NoMatch {
                suggest_override: true,
                ..
            }
        ));
    }

    #[test]
    fn unconfirmed_substitution_requires_confirmation() {
        let wanted = PartId::new();
        let mut o = order();
        o.add_line(wanted, dec!(2), dec!(0)).unwrap();

        let err = match_line(
            &o,
            &stock(PartId::new(), dec!(1)),
            None,
            Some(SubstitutionRequest::new(wanted, false)),
            &none(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "requires_confirmation");
    }

    #[test]
    fn confirmed_substitution_matches_override_line() {
        let wanted = PartId::new();
        let mut o = order();
        let line = o.add_line(wanted, dec!(2), dec!(0)).unwrap();

        let m = match_line(
            &o,
            &stock(PartId::new(), dec!(1)),
            None,
            Some(SubstitutionRequest::new(wanted, true)),
            &none(),
        )
        .unwrap();
        assert_eq!(m.line.id(), line);
        assert!(m.substitution_made());
        // Matched by the override part already, nothing to re-point.
        assert_eq!(m.repoint_to(), None);
    }

    #[test]
    fn explicit_line_with_matching_part_is_used_even_if_not_first() {
        let p = PartId::new();
        let mut o = order();
        o.add_line(p, dec!(2), dec!(0)).unwrap();
        let second = o.add_line(p, dec!(2), dec!(0)).unwrap();

        let explicit = o.line(second).unwrap();
        let m = match_line(&o, &stock(p, dec!(1)), Some(explicit), None, &none()).unwrap();
        assert_eq!(m.line.id(), second);
    }

    #[test]
    fn explicit_line_with_other_part_needs_override() {
        let mut o = order();
        let id = o.add_line(PartId::new(), dec!(2), dec!(0)).unwrap();
        let explicit = o.line(id).unwrap();
        let scanned = stock(PartId::new(), dec!(1));

        let err = match_line(&o, &scanned, Some(explicit), None, &none()).unwrap_err();
        assert_eq!(err.code(), "no_match");

        let err = match_line(
            &o,
            &scanned,
            Some(explicit),
            Some(SubstitutionRequest::new(scanned.part_id(), false)),
            &none(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "requires_confirmation");

        let m = match_line(
            &o,
            &scanned,
            Some(explicit),
            Some(SubstitutionRequest::new(scanned.part_id(), true)),
            &none(),
        )
        .unwrap();
        assert_eq!(m.repoint_to(), Some(scanned.part_id()));
    }

    #[test]
    fn skips_lines_already_covered_by_allocations() {
        let p = PartId::new();
        let mut o = order();
        let first = o.add_line(p, dec!(5), dec!(0)).unwrap();
        let second = o.add_line(p, dec!(5), dec!(1)).unwrap();

        let coverage: LineCoverage = [(first, dec!(5))].into_iter().collect();
        let m = match_line(&o, &stock(p, dec!(5)), None, None, &coverage).unwrap();
        assert_eq!(m.line.id(), second);

        // Partly covered lines still take the lowest line_no.
        let coverage: LineCoverage = [(first, dec!(4))].into_iter().collect();
        let m = match_line(&o, &stock(p, dec!(5)), None, None, &coverage).unwrap();
        assert_eq!(m.line.id(), first);
    }

    #[test]
    fn every_open_line_covered_is_already_fulfilled() {
        let p = PartId::new();
        let mut o = order();
        let first = o.add_line(p, dec!(5), dec!(0)).unwrap();
        let second = o.add_line(p, dec!(5), dec!(3)).unwrap();

        let coverage: LineCoverage = [(first, dec!(5)), (second, dec!(2))].into_iter().collect();
        let err = match_line(&o, &stock(p, dec!(1)), None, None, &coverage).unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::AlreadyFulfilled {
                line_item: first,
                fully_shipped: false,
            }
        );
    }

    #[test]
    fn fully_shipped_line_for_part_is_already_fulfilled() {
        let p = PartId::new();
        let mut o = order();
        o.add_line(PartId::new(), dec!(2), dec!(0)).unwrap();
        let shipped = o.add_line(p, dec!(10), dec!(10)).unwrap();

        let err = match_line(&o, &stock(p, dec!(4)), None, None, &none()).unwrap_err();
        assert_eq!(
            err,
            FulfillmentError::AlreadyFulfilled {
                line_item: shipped,
                fully_shipped: true,
            }
        );
    }

    #[test]
    fn covered_direct_lines_fall_through_to_substitution() {
        let p = PartId::new();
        let wanted = PartId::new();
        let mut o = order();
        let direct = o.add_line(p, dec!(2), dec!(0)).unwrap();
        let other = o.add_line(wanted, dec!(2), dec!(0)).unwrap();

        let coverage: LineCoverage = [(direct, dec!(2))].into_iter().collect();
        let m = match_line(
            &o,
            &stock(p, dec!(1)),
            None,
            Some(SubstitutionRequest::new(wanted, true)),
            &coverage,
        )
        .unwrap();
        assert_eq!(m.line.id(), other);
        assert!(m.substitution_made());
    }

    #[test]
    fn coverage_sums_per_line() {
        let line = LineItemId::new();
        let coverage: LineCoverage = [(line, dec!(2)), (line, dec!(3))].into_iter().collect();
        assert_eq!(coverage.allocated_on(line), dec!(5));
        assert_eq!(coverage.allocated_on(LineItemId::new()), dec!(0));
    }
}
