use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockroom_core::{Entity, PartId, StockItemId};

/// A quantity of one part at one location.
///
/// Allocations reference a stock item; the on-hand quantity is never decremented by
/// allocating against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    id: StockItemId,
    part_id: PartId,
    quantity: Decimal,
    in_stock: bool,
    barcode_hash: Option<String>,
    location: Option<String>,
}

impl StockItem {
    /// New in-stock item without a barcode.
    pub fn new(id: StockItemId, part_id: PartId, quantity: Decimal) -> Self {
        Self {
            id,
            part_id,
            quantity,
            in_stock: true,
            barcode_hash: None,
            location: None,
        }
    }

    pub fn with_barcode_hash(mut self, hash: impl Into<String>) -> Self {
        self.barcode_hash = Some(hash.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_in_stock(mut self, in_stock: bool) -> Self {
        self.in_stock = in_stock;
        self
    }

    pub fn part_id(&self) -> PartId {
        self.part_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn in_stock(&self) -> bool {
        self.in_stock
    }

    pub fn barcode_hash(&self) -> Option<&str> {
        self.barcode_hash.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Whether the item can be allocated at all: flagged in stock with a positive
    /// on-hand quantity.
    pub fn is_available(&self) -> bool {
        self.in_stock && self.quantity > Decimal::ZERO
    }
}

impl Entity for StockItem {
    type Id = StockItemId;

    fn id(&self) -> StockItemId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn availability_requires_flag_and_positive_quantity() {
        let part = PartId::new();
        assert!(StockItem::new(StockItemId::new(), part, dec!(1)).is_available());
        assert!(!StockItem::new(StockItemId::new(), part, dec!(0)).is_available());
        assert!(!StockItem::new(StockItemId::new(), part, dec!(-2)).is_available());
        assert!(
            !StockItem::new(StockItemId::new(), part, dec!(5))
                .with_in_stock(false)
                .is_available()
        );
    }

    #[test]
    fn builder_sets_barcode_and_location() {
        let item = StockItem::new(StockItemId::new(), PartId::new(), dec!(3))
            .with_barcode_hash("abc")
            .with_location("A-01");
        assert_eq!(item.barcode_hash(), Some("abc"));
        assert_eq!(item.location(), Some("A-01"));
    }
}
