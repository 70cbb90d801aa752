//! Catalog & stock ledger domain module.
//!
//! This crate contains business rules for catalog items and their
//! quantity-on-hand, implemented purely as deterministic domain logic
//! (no IO, no storage).

pub mod category;
pub mod item;

pub use category::Category;
pub use item::{Item, ItemChanges, ItemKind};
