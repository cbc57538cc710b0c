use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{AllocationId, DomainError, DomainResult, Entity, LineItemId, StockItemId};

/// Stock committed from one stock item toward one line item.
///
/// At most one allocation exists per `(line_id, stock_item_id)` pair; scanning the
/// same stock item again grows the existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    id: AllocationId,
    line_id: LineItemId,
    stock_item_id: StockItemId,
    quantity: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Allocation {
    pub fn new(
        id: AllocationId,
        line_id: LineItemId,
        stock_item_id: StockItemId,
        quantity: Decimal,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity < Decimal::ZERO {
            return Err(DomainError::validation("allocation quantity must not be negative"));
        }
        Ok(Self {
            id,
            line_id,
            stock_item_id,
            quantity,
            created_at,
            updated_at: created_at,
        })
    }

    /// Rebuild a stored allocation (both timestamps known).
    pub fn restore(
        id: AllocationId,
        line_id: LineItemId,
        stock_item_id: StockItemId,
        quantity: Decimal,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut allocation = Self::new(id, line_id, stock_item_id, quantity, created_at)?;
        allocation.updated_at = updated_at;
        Ok(allocation)
    }

    pub fn line_id(&self) -> LineItemId {
        self.line_id
    }

    pub fn stock_item_id(&self) -> StockItemId {
        self.stock_item_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Grow this allocation by `fulfill`, never beyond `cap`.
    pub fn accumulate(&mut self, fulfill: Decimal, cap: Decimal, at: DateTime<Utc>) {
        self.quantity = accumulated_quantity(self.quantity, fulfill, cap);
        self.updated_at = at;
    }
}

impl Entity for Allocation {
    type Id = AllocationId;

    fn id(&self) -> AllocationId {
        self.id
    }
}

/// `min(existing + fulfill, cap)`, floored at zero.
///
/// Shared by every store so the in-memory and SQL upserts agree.
pub fn accumulated_quantity(existing: Decimal, fulfill: Decimal, cap: Decimal) -> Decimal {
    (existing + fulfill).min(cap).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn allocation(quantity: Decimal) -> Allocation {
        Allocation::new(
            AllocationId::new(),
            LineItemId::new(),
            StockItemId::new(),
            quantity,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let err = Allocation::new(
            AllocationId::new(),
            LineItemId::new(),
            StockItemId::new(),
            dec!(-1),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn accumulate_adds_until_cap() {
        let mut a = allocation(dec!(4));
        a.accumulate(dec!(4), dec!(10), Utc::now());
        assert_eq!(a.quantity(), dec!(8));
        a.accumulate(dec!(4), dec!(10), Utc::now());
        assert_eq!(a.quantity(), dec!(10));
    }

    #[test]
    fn accumulate_moves_updated_at_only() {
        let mut a = allocation(dec!(1));
        let created = a.created_at();
        let later = created + chrono::Duration::seconds(5);
        a.accumulate(dec!(1), dec!(5), later);
        assert_eq!(a.created_at(), created);
        assert_eq!(a.updated_at(), later);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the accumulated quantity never exceeds the cap and never shrinks
        /// an allocation that was already within the cap.
        #[test]
        fn accumulated_quantity_is_capped_and_monotone(
            existing in 0i64..1_000,
            fulfill in 0i64..1_000,
            cap in 0i64..1_000,
        ) {
            let existing = Decimal::from(existing.min(cap));
            let fulfill = Decimal::from(fulfill);
            let cap = Decimal::from(cap);

            let next = accumulated_quantity(existing, fulfill, cap);
            prop_assert!(next <= cap);
            prop_assert!(next >= existing);
        }
    }
}
