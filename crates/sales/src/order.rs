use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderdesk_core::{
    AggregateRoot, DomainError, DomainResult, Entity, ItemId, MemberId, OrderId,
};
use orderdesk_inventory::Item;
use orderdesk_members::Member;

use crate::delivery::{Delivery, DeliveryStatus};
use crate::order_item::OrderItem;

/// Order status lifecycle: `Ordered` → `Cancelled`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Ordered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Ordered => "ORDERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDERED" => Ok(OrderStatus::Ordered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// Where cancelled quantities go back to.
///
/// Implemented by an item map for in-process use and by datastore sessions,
/// which load the item, restock it and stage the write.
pub trait StockLedger {
    fn restock(&mut self, item_id: ItemId, quantity: u32) -> DomainResult<()>;
}

impl StockLedger for BTreeMap<ItemId, Item> {
    fn restock(&mut self, item_id: ItemId, quantity: u32) -> DomainResult<()> {
        self.get_mut(&item_id)
            .ok_or_else(|| DomainError::not_found(Item::NAME, item_id))?
            .add_stock(quantity)
    }
}

fn sum_lines(lines: &[OrderItem]) -> DomainResult<u64> {
    lines.iter().try_fold(0u64, |total, line| {
        total
            .checked_add(line.total_price()?)
            .ok_or_else(|| DomainError::validation("order total overflows"))
    })
}

/// Aggregate root: Order.
///
/// Owns its lines and its delivery outright; the member is referenced by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    member_id: MemberId,
    order_items: Vec<OrderItem>,
    delivery: Delivery,
    order_date: DateTime<Utc>,
    status: OrderStatus,
    version: u64,
}

impl Order {
    /// Assemble an order from lines that were already built (and already took
    /// their stock) via [`OrderItem::create`].
    pub fn create(
        member: &Member,
        delivery: Delivery,
        order_items: Vec<OrderItem>,
    ) -> DomainResult<Self> {
        Self::create_at(member, delivery, order_items, Utc::now())
    }

    pub fn create_at(
        member: &Member,
        mut delivery: Delivery,
        mut order_items: Vec<OrderItem>,
        order_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if order_items.is_empty() {
            return Err(DomainError::validation(
                "an order needs at least one order item",
            ));
        }
        if order_items.iter().any(|line| line.order_id().is_some())
            || delivery.order_id().is_some()
        {
            return Err(DomainError::illegal_state(
                "order items and deliveries cannot be shared between orders",
            ));
        }

        sum_lines(&order_items)?;

        let id = OrderId::new();
        delivery.bind(id);
        for line in &mut order_items {
            line.bind(id);
        }

        Ok(Self {
            id,
            member_id: member.id_typed(),
            order_items,
            delivery,
            order_date,
            status: OrderStatus::Ordered,
            version: 0,
        })
    }

    /// Rebuild an order from persisted rows.
    pub fn restore(
        id: OrderId,
        member_id: MemberId,
        order_items: Vec<OrderItem>,
        delivery: Delivery,
        order_date: DateTime<Utc>,
        status: OrderStatus,
        version: u64,
    ) -> Self {
        Self {
            id,
            member_id,
            order_items,
            delivery,
            order_date,
            status,
            version,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn order_items(&self) -> &[OrderItem] {
        &self.order_items
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn order_date(&self) -> DateTime<Utc> {
        self.order_date
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Stamp the version assigned by the datastore after a save.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Cancel the order and put every line's quantity back into stock.
    ///
    /// Refused once the delivery has completed, and for orders that are
    /// already cancelled. The status only flips after all lines restocked;
    /// a failing line leaves the order `Ordered` and the caller's transaction
    /// is expected to discard the partial restock.
    pub fn cancel(&mut self, ledger: &mut impl StockLedger) -> DomainResult<()> {
        if self.delivery.is_delivered() {
            return Err(DomainError::illegal_state(
                "a delivered order cannot be cancelled",
            ));
        }
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::illegal_state("order is already cancelled"));
        }

        for line in &self.order_items {
            line.cancel(ledger)?;
        }
        self.status = OrderStatus::Cancelled;
        Ok(())
    }

    /// Sum of `order_price * count` over all lines; `Validation` on overflow.
    pub fn total_price(&self) -> DomainResult<u64> {
        sum_lines(&self.order_items)
    }

    pub fn start_delivery(&mut self) -> DomainResult<()> {
        self.ensure_active()?;
        self.delivery.advance(DeliveryStatus::InProgress)
    }

    pub fn complete_delivery(&mut self) -> DomainResult<()> {
        self.ensure_active()?;
        self.delivery.advance(DeliveryStatus::Delivered)
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::illegal_state(
                "a cancelled order cannot be delivered",
            ));
        }
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;
    const NAME: &'static str = "order";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Order {
    fn version(&self) -> u64 {
        self.version
    }
}
