use serde::{Deserialize, Serialize};

use orderdesk_core::{DomainError, DomainResult, ItemId, OrderId, OrderItemId};
use orderdesk_inventory::Item;

use crate::order::StockLedger;

/// Order line: item reference, price snapshot, quantity.
///
/// `order_price` is captured at creation and never follows later price edits
/// on the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    id: OrderItemId,
    item_id: ItemId,
    order_id: Option<OrderId>,
    /// Unit price in smallest currency unit, at purchase time.
    order_price: u64,
    count: u32,
}

impl OrderItem {
    /// Build a line and take `count` units out of the item's stock.
    ///
    /// On `InsufficientStock` no line exists and the item is untouched.
    pub fn create(item: &mut Item, order_price: u64, count: u32) -> DomainResult<Self> {
        if count == 0 {
            return Err(DomainError::validation("order count must be positive"));
        }
        line_total(order_price, count)?;
        item.remove_stock(count)?;
        Ok(Self {
            id: OrderItemId::new(),
            item_id: item.id_typed(),
            order_id: None,
            order_price,
            count,
        })
    }

    /// Rebuild a line from persisted columns.
    pub fn restore(
        id: OrderItemId,
        item_id: ItemId,
        order_id: OrderId,
        order_price: u64,
        count: u32,
    ) -> Self {
        Self {
            id,
            item_id,
            order_id: Some(order_id),
            order_price,
            count,
        }
    }

    pub fn id(&self) -> OrderItemId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn order_price(&self) -> u64 {
        self.order_price
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// `order_price * count`; `Validation` when it does not fit in a `u64`.
    pub fn total_price(&self) -> DomainResult<u64> {
        line_total(self.order_price, self.count)
    }

    pub(crate) fn bind(&mut self, order_id: OrderId) {
        self.order_id = Some(order_id);
    }

    /// Give the reserved units back to the item.
    pub(crate) fn cancel(&self, ledger: &mut impl StockLedger) -> DomainResult<()> {
        ledger.restock(self.item_id, self.count)
    }
}

fn line_total(order_price: u64, count: u32) -> DomainResult<u64> {
    order_price
        .checked_mul(u64::from(count))
        .ok_or_else(|| DomainError::validation("order line total overflows"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_snapshots_price_and_takes_stock() {
        let mut book = Item::book("JPA1 Book", 10_000, 100, "kim", "1").unwrap();
        let line = OrderItem::create(&mut book, 10_000, 2).unwrap();
        assert_eq!(line.item_id(), book.id_typed());
        assert_eq!(line.order_price(), 10_000);
        assert_eq!(line.count(), 2);
        assert_eq!(line.total_price().unwrap(), 20_000);
        assert_eq!(line.order_id(), None);
        assert_eq!(book.stock_quantity(), 98);
    }

    #[test]
    fn insufficient_stock_creates_nothing() {
        let mut book = Item::book("book", 10_000, 10, "kim", "1").unwrap();
        let err = OrderItem::create(&mut book, 10_000, 11).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));
        assert_eq!(book.stock_quantity(), 10);
    }

    #[test]
    fn zero_count_is_rejected_before_touching_stock() {
        let mut book = Item::book("book", 10_000, 10, "kim", "1").unwrap();
        assert!(matches!(
            OrderItem::create(&mut book, 10_000, 0),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(book.stock_quantity(), 10);
    }

    #[test]
    fn overflowing_line_total_is_rejected_before_touching_stock() {
        let mut book = Item::book("book", u64::MAX / 2, 10, "kim", "1").unwrap();
        let err = OrderItem::create(&mut book, u64::MAX / 2, 3).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(book.stock_quantity(), 10);
    }

    #[test]
    fn restored_line_reports_overflow_instead_of_wrapping() {
        let line = OrderItem::restore(
            OrderItemId::new(),
            ItemId::new(),
            OrderId::new(),
            u64::MAX / 2,
            3,
        );
        assert!(matches!(line.total_price(), Err(DomainError::Validation(_))));
    }
}
