//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are never mutated in place; "changing"
/// one means building a new value. `Address` is the canonical example here: a
/// member's address is copied into each delivery, so later edits to the member
/// never rewrite where past orders were shipped.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
