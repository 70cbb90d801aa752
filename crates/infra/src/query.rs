//! Dynamic order search and typed query shapes.
//!
//! An [`OrderQuery`] carries its fetch shape and pagination state in the
//! type. Joining the order-item collection is only offered on an unpaged
//! query, and the collection-fetch shape has neither a `paginate` method nor
//! a second collection join, so "page over exploded rows" cannot be written.
//!
//! ```compile_fail
//! use orderdesk_infra::query::{OrderQuery, Page};
//!
//! let query = OrderQuery::all(1000)
//!     .fetch_member_delivery()
//!     .fetch_order_items()
//!     .paginate(Page::new(0, 10));
//! ```
//!
//! ```compile_fail
//! use orderdesk_infra::query::{OrderQuery, Page};
//!
//! let query = OrderQuery::all(1000)
//!     .fetch_member_delivery()
//!     .paginate(Page::new(0, 10))
//!     .fetch_order_items();
//! ```

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use orderdesk_members::Member;
use orderdesk_sales::OrderStatus;

use crate::store::OrderRow;

/// Optional search filters coming from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSearch {
    pub member_name: Option<String>,
    pub order_status: Option<OrderStatus>,
}

impl OrderSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member_name(mut self, name: impl Into<String>) -> Self {
        self.member_name = Some(name.into());
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.order_status = Some(status);
        self
    }

    /// Predicates appended only for the filters that are actually set.
    ///
    /// A blank member name counts as unset.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(status) = self.order_status {
            predicates.push(Predicate::StatusEq(status));
        }
        if let Some(name) = self
            .member_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            predicates.push(Predicate::MemberNameContains(name.to_string()));
        }
        predicates
    }
}

/// One AND-ed condition over the order ⋈ member join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    StatusEq(OrderStatus),
    /// Literal substring match on the member name.
    MemberNameContains(String),
}

impl Predicate {
    pub fn matches(&self, order: &OrderRow, member: &Member) -> bool {
        match self {
            Predicate::StatusEq(status) => order.status == *status,
            Predicate::MemberNameContains(needle) => member.name().contains(needle.as_str()),
        }
    }
}

/// Offset/limit window over the matching rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Which associations a query loads together with the order row.
pub trait FetchShape: sealed::Sealed {
    const NAME: &'static str;
}

/// Shapes where offset/limit stays correct (only to-one joins).
pub trait AllowsPaging: FetchShape {}

/// Order row joined to member for filtering only.
#[derive(Debug, Clone, Copy)]
pub struct Plain;

/// Order joined with its member and delivery.
#[derive(Debug, Clone, Copy)]
pub struct ToOneFetch;

/// Order joined with member, delivery, order items and their items.
#[derive(Debug, Clone, Copy)]
pub struct CollectionFetch;

impl sealed::Sealed for Plain {}
impl sealed::Sealed for ToOneFetch {}
impl sealed::Sealed for CollectionFetch {}

impl FetchShape for Plain {
    const NAME: &'static str = "plain";
}
impl FetchShape for ToOneFetch {
    const NAME: &'static str = "to_one";
}
impl FetchShape for CollectionFetch {
    const NAME: &'static str = "collection";
}

impl AllowsPaging for Plain {}
impl AllowsPaging for ToOneFetch {}

/// Pagination state markers.
#[derive(Debug, Clone, Copy)]
pub struct Unpaged;

#[derive(Debug, Clone, Copy)]
pub struct Paged;

/// Order query with incrementally built predicates.
///
/// `max_results` always holds the configured cap (or a smaller page limit).
#[derive(Debug, Clone)]
pub struct OrderQuery<F = Plain, P = Unpaged> {
    predicates: Vec<Predicate>,
    first_result: usize,
    max_results: usize,
    _state: PhantomData<(F, P)>,
}

impl OrderQuery<Plain, Unpaged> {
    /// Every order, up to `cap` rows.
    pub fn all(cap: usize) -> Self {
        Self {
            predicates: Vec::new(),
            first_result: 0,
            max_results: cap,
            _state: PhantomData,
        }
    }

    pub fn from_search(search: &OrderSearch, cap: usize) -> Self {
        Self {
            predicates: search.predicates(),
            ..Self::all(cap)
        }
    }
}

impl<F, P> OrderQuery<F, P> {
    fn into_state<G, Q>(self) -> OrderQuery<G, Q> {
        OrderQuery {
            predicates: self.predicates,
            first_result: self.first_result,
            max_results: self.max_results,
            _state: PhantomData,
        }
    }

    /// AND another condition onto the query.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn first_result(&self) -> usize {
        self.first_result
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// True when every predicate accepts the joined row.
    pub fn accepts(&self, order: &OrderRow, member: &Member) -> bool {
        self.predicates.iter().all(|p| p.matches(order, member))
    }
}

impl<P> OrderQuery<Plain, P> {
    /// Join member and delivery into the same statement.
    pub fn fetch_member_delivery(self) -> OrderQuery<ToOneFetch, P> {
        self.into_state()
    }
}

impl<F: AllowsPaging> OrderQuery<F, Unpaged> {
    /// Window the results; the limit never exceeds the configured cap.
    pub fn paginate(self, page: Page) -> OrderQuery<F, Paged> {
        let mut query: OrderQuery<F, Paged> = self.into_state();
        query.first_result = page.offset;
        query.max_results = page.limit.min(query.max_results);
        query
    }
}

impl OrderQuery<ToOneFetch, Unpaged> {
    /// Join the order-item collection (and each line's item).
    ///
    /// Rows come back exploded per line and are deduplicated by order id;
    /// the cap is applied to distinct orders after deduplication.
    pub fn fetch_order_items(self) -> OrderQuery<CollectionFetch, Unpaged> {
        self.into_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_without_filters_has_no_predicates() {
        let query = OrderQuery::from_search(&OrderSearch::new(), 1000);
        assert!(query.predicates().is_empty());
        assert_eq!(query.max_results(), 1000);
        assert_eq!(query.first_result(), 0);
    }

    #[test]
    fn blank_member_name_is_ignored() {
        let search = OrderSearch::new().member_name("   ");
        assert!(search.predicates().is_empty());
    }

    #[test]
    fn filters_become_predicates_in_order() {
        let search = OrderSearch::new()
            .member_name(" user ")
            .status(OrderStatus::Ordered);
        assert_eq!(
            search.predicates(),
            vec![
                Predicate::StatusEq(OrderStatus::Ordered),
                Predicate::MemberNameContains("user".to_string()),
            ]
        );
    }

    #[test]
    fn page_limit_is_clamped_to_cap() {
        let query = OrderQuery::all(1000)
            .fetch_member_delivery()
            .paginate(Page::new(5, 5_000));
        assert_eq!(query.first_result(), 5);
        assert_eq!(query.max_results(), 1000);
    }

    #[test]
    fn to_one_joins_keep_pagination() {
        let query = OrderQuery::all(1000)
            .paginate(Page::new(1, 2))
            .fetch_member_delivery();
        assert_eq!(query.first_result(), 1);
        assert_eq!(query.max_results(), 2);
    }

    #[test]
    fn collection_fetch_keeps_cap_and_predicates() {
        let query = OrderQuery::from_search(&OrderSearch::new().status(OrderStatus::Cancelled), 7)
            .fetch_member_delivery()
            .fetch_order_items();
        assert_eq!(query.max_results(), 7);
        assert_eq!(query.predicates().len(), 1);
        assert_eq!(<CollectionFetch as FetchShape>::NAME, "collection");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            #[test]
            fn a_page_never_exceeds_the_cap(
                cap in 1usize..2_000,
                offset in 0usize..10_000,
                limit in 0usize..10_000,
            ) {
                let query = OrderQuery::all(cap).paginate(Page::new(offset, limit));
                prop_assert!(query.max_results() <= cap);
                prop_assert_eq!(query.max_results(), limit.min(cap));
                prop_assert_eq!(query.first_result(), offset);
            }

            #[test]
            fn trimmed_names_survive_as_predicates(name in "[ ]{0,3}[a-zA-Z]{0,8}[ ]{0,3}") {
                let predicates = OrderSearch::new().member_name(name.as_str()).predicates();
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    prop_assert!(predicates.is_empty());
                } else {
                    prop_assert_eq!(
                        predicates,
                        vec![Predicate::MemberNameContains(trimmed.to_string())]
                    );
                }
            }
        }
    }
}
