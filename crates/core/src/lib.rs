//! `orderdesk-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod address;
pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use address::Address;
pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{CategoryId, DeliveryId, ItemId, MemberId, OrderId, OrderItemId};
pub use value_object::ValueObject;
