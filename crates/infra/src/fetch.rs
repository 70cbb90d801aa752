//! Read paths that materialize the Order → Member → Delivery → OrderItem → Item
//! graph.
//!
//! All four paths return the same logical data; they differ in how many
//! round trips they need and whether they can be paginated.
//!
//! | Strategy | Round trips | Paginates |
//! |---|---|---|
//! | [`fetch_lazy`] | 1 + members + 2N + items | yes |
//! | [`fetch_with_member_delivery`] | 3 per batch | yes |
//! | [`fetch_with_items`] | 1 | no (does not type-check) |
//! | [`find_order_summaries`] | 1 | yes |

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use orderdesk_core::{DomainError, ItemId, MemberId, OrderId};
use orderdesk_inventory::Item;
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, Order, OrderItem};

use crate::error::{StoreError, StoreResult};
use crate::projection::OrderSummary;
use crate::query::{CollectionFetch, OrderQuery, Page, Plain, ToOneFetch, Unpaged};
use crate::repository::Repository;
use crate::store::{CollectionRow, OrderRow, Session, ToOneRow};

/// Above this many orders an unpaginated collection join is not recommended.
pub const SMALL_RESULT_SET: usize = 100;

/// Fully loaded order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderGraph {
    pub order: Order,
    pub member: Member,
    /// Catalog item of each line, index-aligned with `order.order_items()`.
    pub items: Vec<Item>,
}

impl OrderGraph {
    pub fn lines(&self) -> impl Iterator<Item = (&OrderItem, &Item)> {
        self.order.order_items().iter().zip(&self.items)
    }
}

/// The available read paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FetchStrategy {
    Lazy,
    JoinToOneBatched,
    JoinCollection,
    FlatProjection,
}

impl FetchStrategy {
    pub const ALL: [FetchStrategy; 4] = [
        FetchStrategy::Lazy,
        FetchStrategy::JoinToOneBatched,
        FetchStrategy::JoinCollection,
        FetchStrategy::FlatProjection,
    ];

    /// Pick a read path for a listing.
    ///
    /// The lazy path is never recommended; it exists as the baseline.
    pub fn recommended(page: Option<Page>, display_only: bool, expected_orders: usize) -> Self {
        if display_only {
            FetchStrategy::FlatProjection
        } else if page.is_some() || expected_orders > SMALL_RESULT_SET {
            FetchStrategy::JoinToOneBatched
        } else {
            FetchStrategy::JoinCollection
        }
    }

    pub fn is_known_worst(self) -> bool {
        self == FetchStrategy::Lazy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FetchStrategy::Lazy => "LAZY",
            FetchStrategy::JoinToOneBatched => "JOIN_TO_ONE_BATCHED",
            FetchStrategy::JoinCollection => "JOIN_COLLECTION",
            FetchStrategy::FlatProjection => "FLAT_PROJECTION",
        }
    }
}

/// Strategy 1: search, then touch every association one lookup at a time.
///
/// Repeated members and items within one call are served from an identity
/// map, as a persistence context would.
pub fn fetch_lazy<P>(
    session: &Session<'_>,
    query: &OrderQuery<Plain, P>,
) -> StoreResult<Vec<OrderGraph>> {
    let rows = session.search(query)?;
    let mut members: HashMap<MemberId, Member> = HashMap::new();
    let mut items: HashMap<ItemId, Item> = HashMap::new();
    let mut graphs = Vec::with_capacity(rows.len());

    for row in rows {
        let member = match members.get(&row.member_id) {
            Some(member) => member.clone(),
            None => {
                let member: Member = session.get(row.member_id)?;
                members.insert(row.member_id, member.clone());
                member
            }
        };
        let delivery = session
            .find_delivery(row.delivery_id)?
            .ok_or_else(|| DomainError::not_found("delivery", row.delivery_id))?;
        let lines = session.find_order_items(row.id)?;

        let mut line_items = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = match items.get(&line.item_id()) {
                Some(item) => item.clone(),
                None => {
                    let item: Item = session.get(line.item_id())?;
                    items.insert(line.item_id(), item.clone());
                    item
                }
            };
            line_items.push(item);
        }

        graphs.push(OrderGraph {
            order: restore(&row, lines, delivery),
            member,
            items: line_items,
        });
    }

    debug!(orders = graphs.len(), "lazy fetch finished");
    Ok(graphs)
}

/// Strategy 2: join-fetch member and delivery, then batch the collections.
///
/// One joined query for the orders (paginated or not), one `IN` query for the
/// lines and one for their items, each repeated per `batch_fetch_size` chunk.
pub fn fetch_with_member_delivery<P>(
    session: &Session<'_>,
    query: &OrderQuery<ToOneFetch, P>,
) -> StoreResult<Vec<OrderGraph>> {
    let rows = session.search_fetch_to_one(query)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let batch = session.config().batch_fetch_size.max(1);

    let order_ids: Vec<OrderId> = rows.iter().map(|row| row.order.id).collect();
    let mut lines = Vec::new();
    for chunk in order_ids.chunks(batch) {
        lines.extend(session.find_order_items_in(chunk)?);
    }

    let item_ids = distinct_item_ids(&lines);
    let mut items = Vec::with_capacity(item_ids.len());
    for chunk in item_ids.chunks(batch) {
        items.extend(session.find_items_in(chunk)?);
    }

    let graphs = assemble_batched(rows, lines, items)?;
    debug!(orders = graphs.len(), batch, "join fetch with batched collections finished");
    Ok(graphs)
}

/// Item ids referenced by `lines`, without duplicates.
pub(crate) fn distinct_item_ids(lines: &[OrderItem]) -> Vec<ItemId> {
    lines
        .iter()
        .map(OrderItem::item_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Stitch separately loaded lines and items onto join-fetched order rows.
pub(crate) fn assemble_batched(
    rows: Vec<ToOneRow>,
    lines: Vec<OrderItem>,
    items: Vec<Item>,
) -> StoreResult<Vec<OrderGraph>> {
    let mut lines_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
    for line in lines {
        if let Some(order_id) = line.order_id() {
            lines_by_order.entry(order_id).or_default().push(line);
        }
    }
    let items: HashMap<ItemId, Item> = items
        .into_iter()
        .map(|item| (item.id_typed(), item))
        .collect();

    rows.into_iter()
        .map(|row| {
            let order_lines = lines_by_order.remove(&row.order.id).unwrap_or_default();
            let line_items = order_lines
                .iter()
                .map(|line| {
                    items.get(&line.item_id()).cloned().ok_or_else(|| {
                        StoreError::from(DomainError::not_found("item", line.item_id()))
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(OrderGraph {
                order: restore(&row.order, order_lines, row.delivery),
                member: row.member,
                items: line_items,
            })
        })
        .collect()
}

/// Strategy 3: one query joining everything, deduplicated by order id.
///
/// The configured cap counts distinct orders, not exploded rows.
pub fn fetch_with_items(
    session: &Session<'_>,
    query: &OrderQuery<CollectionFetch, Unpaged>,
) -> StoreResult<Vec<OrderGraph>> {
    let rows = session.search_fetch_collection(query)?;
    let exploded = rows.len();
    let graphs = dedup_collection(rows, query.max_results());
    debug!(exploded, orders = graphs.len(), "collection fetch deduplicated");
    Ok(graphs)
}

/// Fold exploded rows back into one graph per order, keeping first-seen
/// order, then apply `cap` to the distinct orders.
pub(crate) fn dedup_collection(rows: Vec<CollectionRow>, cap: usize) -> Vec<OrderGraph> {
    let mut partial: Vec<PartialGraph> = Vec::new();
    let mut position: HashMap<OrderId, usize> = HashMap::new();
    for row in rows {
        let slot = match position.get(&row.order.id) {
            Some(slot) => *slot,
            None => {
                position.insert(row.order.id, partial.len());
                partial.push(PartialGraph {
                    order: row.order,
                    member: row.member,
                    delivery: row.delivery,
                    lines: Vec::new(),
                    items: Vec::new(),
                });
                partial.len() - 1
            }
        };
        partial[slot].lines.push(row.line);
        partial[slot].items.push(row.item);
    }

    partial
        .into_iter()
        .take(cap)
        .map(PartialGraph::finish)
        .collect()
}

/// Strategy 4: select the display columns directly.
pub fn find_order_summaries<P>(
    session: &Session<'_>,
    query: &OrderQuery<Plain, P>,
) -> StoreResult<Vec<OrderSummary>> {
    session.select_summaries(query)
}

struct PartialGraph {
    order: OrderRow,
    member: Member,
    delivery: Delivery,
    lines: Vec<OrderItem>,
    items: Vec<Item>,
}

impl PartialGraph {
    fn finish(self) -> OrderGraph {
        OrderGraph {
            order: restore(&self.order, self.lines, self.delivery),
            member: self.member,
            items: self.items,
        }
    }
}

fn restore(row: &OrderRow, lines: Vec<OrderItem>, delivery: Delivery) -> Order {
    Order::restore(
        row.id,
        row.member_id,
        lines,
        delivery,
        row.order_date,
        row.status,
        row.version,
    )
}
