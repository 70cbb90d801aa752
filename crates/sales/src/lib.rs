//! Orders domain module.
//!
//! This crate contains the order aggregate: an `Order` exclusively owns its
//! `OrderItem`s and its `Delivery`, and drives stock changes on the items it
//! references. Pure domain logic (no IO, no storage).

pub mod delivery;
pub mod order;
pub mod order_item;

pub use delivery::{Delivery, DeliveryStatus};
pub use order::{Order, OrderStatus, StockLedger};
pub use order_item::OrderItem;
