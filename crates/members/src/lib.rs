//! Members domain module (customers who place orders).
//!
//! A member never owns its orders: the member → orders edge is an index kept
//! by the datastore, keyed by member id.

pub mod member;

pub use member::Member;
