//! In-memory relational datastore with a unit of work.
//!
//! Tables mirror the relational layout: orders reference their member and
//! delivery by id, order lines are keyed by `(order_id, order_item_id)` so the
//! lines of one order are a contiguous range, and `member_orders` is the
//! member→orders index.
//!
//! Reads go through a shared [`Session`] holding the read lock. Writes go
//! through [`InMemoryDatastore::transaction`], which works on a private copy
//! and publishes it in one step at commit, after version checks.

mod log;
mod session;

pub use log::{QueryLog, Statement, StatementKind, DEFAULT_RECENT_CAPACITY};
pub use session::Session;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use orderdesk_core::{
    AggregateRoot, CategoryId, DeliveryId, DomainError, ExpectedVersion, ItemId, MemberId,
    OrderId, OrderItemId,
};
use orderdesk_inventory::{Category, Item};
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, Order, OrderItem, OrderStatus};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// `orders` row: the order without its owned children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRow {
    pub id: OrderId,
    pub member_id: MemberId,
    pub delivery_id: DeliveryId,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    pub version: u64,
}

impl OrderRow {
    pub fn of(order: &Order) -> Self {
        Self {
            id: order.id_typed(),
            member_id: order.member_id(),
            delivery_id: order.delivery().id(),
            order_date: order.order_date(),
            status: order.status(),
            version: order.version(),
        }
    }
}

/// Result row of an order joined with its to-one associations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToOneRow {
    pub order: OrderRow,
    pub member: Member,
    pub delivery: Delivery,
}

/// Result row of an order joined with one of its lines: one row per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRow {
    pub order: OrderRow,
    pub member: Member,
    pub delivery: Delivery,
    pub line: OrderItem,
    pub item: Item,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(crate) members: BTreeMap<MemberId, Member>,
    pub(crate) items: BTreeMap<ItemId, Item>,
    pub(crate) categories: BTreeMap<CategoryId, Category>,
    pub(crate) orders: BTreeMap<OrderId, OrderRow>,
    pub(crate) order_items: BTreeMap<(OrderId, OrderItemId), OrderItem>,
    pub(crate) deliveries: BTreeMap<DeliveryId, Delivery>,
    pub(crate) member_orders: BTreeSet<(MemberId, OrderId)>,
}

impl Tables {
    fn line_range(order_id: OrderId) -> RangeInclusive<(OrderId, OrderItemId)> {
        (order_id, OrderItemId::from_uuid(Uuid::nil()))
            ..=(order_id, OrderItemId::from_uuid(Uuid::from_u128(u128::MAX)))
    }

    pub(crate) fn lines_of(&self, order_id: OrderId) -> impl Iterator<Item = &OrderItem> {
        self.order_items
            .range(Self::line_range(order_id))
            .map(|(_, line)| line)
    }

    pub(crate) fn order_ids_of(&self, member_id: MemberId) -> impl Iterator<Item = OrderId> {
        self.member_orders
            .range(
                (member_id, OrderId::from_uuid(Uuid::nil()))
                    ..=(member_id, OrderId::from_uuid(Uuid::from_u128(u128::MAX))),
            )
            .map(|(_, order_id)| *order_id)
    }

    /// Replace the order and all of its owned rows.
    pub(crate) fn put_order(&mut self, order: &Order) {
        let id = order.id_typed();
        self.remove_order(id);
        let delivery = order.delivery();
        self.deliveries.insert(delivery.id(), delivery.clone());
        for line in order.order_items() {
            self.order_items.insert((id, line.id()), line.clone());
        }
        self.member_orders.insert((order.member_id(), id));
        self.orders.insert(id, OrderRow::of(order));
    }

    /// Delete the order together with its delivery and lines.
    pub(crate) fn remove_order(&mut self, id: OrderId) -> Option<OrderRow> {
        let row = self.orders.remove(&id)?;
        self.deliveries.remove(&row.delivery_id);
        let keys: Vec<_> = self
            .order_items
            .range(Self::line_range(id))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.order_items.remove(&key);
        }
        self.member_orders.remove(&(row.member_id, id));
        Some(row)
    }

    pub(crate) fn assemble_order(&self, row: &OrderRow) -> StoreResult<Order> {
        let delivery = self
            .deliveries
            .get(&row.delivery_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("delivery", row.delivery_id))?;
        Ok(Order::restore(
            row.id,
            row.member_id,
            self.lines_of(row.id).cloned().collect(),
            delivery,
            row.order_date,
            row.status,
            row.version,
        ))
    }
}

/// Rows touched by a unit of work, with the version each was read at.
#[derive(Debug, Default)]
pub(crate) struct WriteSet {
    pub(crate) members: BTreeSet<MemberId>,
    pub(crate) items: BTreeMap<ItemId, ExpectedVersion>,
    pub(crate) categories: BTreeSet<CategoryId>,
    pub(crate) orders: BTreeMap<OrderId, ExpectedVersion>,
}

impl WriteSet {
    fn is_empty(&self) -> bool {
        self.members.is_empty()
            && self.items.is_empty()
            && self.categories.is_empty()
            && self.orders.is_empty()
    }
}

/// In-memory datastore shared by services.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    tables: RwLock<Tables>,
    log: QueryLog,
    config: StoreConfig,
}

impl InMemoryDatastore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            log: QueryLog::new(),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn query_log(&self) -> &QueryLog {
        &self.log
    }

    /// Shared read session. Holds the read lock until dropped, so do not
    /// commit a transaction on the same thread while one is alive.
    pub fn read(&self) -> StoreResult<Session<'_>> {
        let guard = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(Session::reading(self, guard))
    }

    /// Start a unit of work over a private copy of the tables.
    ///
    /// Dropping the session without [`Session::commit`] discards every change.
    pub fn begin(&self) -> StoreResult<Session<'_>> {
        let snapshot = self
            .tables
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone();
        Ok(Session::writing(self, snapshot))
    }

    /// Run `work` in a unit of work; commit on `Ok`, roll back on `Err`.
    pub fn transaction<T>(
        &self,
        work: impl FnOnce(&mut Session<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut session = self.begin()?;
        match work(&mut session) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    /// Run `work` against a shared read session.
    pub fn read_with<T>(
        &self,
        work: impl FnOnce(&Session<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let session = self.read()?;
        work(&session)
    }

    pub(crate) fn apply(&self, working: Tables, writes: WriteSet) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let orders = writes
            .orders
            .keys()
            .map(|id| {
                let order = working
                    .orders
                    .get(id)
                    .map(|row| working.assemble_order(row))
                    .transpose()?;
                Ok((*id, order))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut live = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;

        check_versions("item", &writes.items, |id| {
            live.items.get(id).map(AggregateRoot::version)
        })?;
        check_versions("order", &writes.orders, |id| {
            live.orders.get(id).map(|row| row.version)
        })?;
        if self.config.unique_member_names {
            check_member_names(&live, &working, &writes.members)?;
        }

        sync(&mut live.members, &working.members, &writes.members);
        sync(&mut live.items, &working.items, writes.items.keys());
        sync(&mut live.categories, &working.categories, &writes.categories);
        for (id, order) in &orders {
            live.remove_order(*id);
            if let Some(order) = order {
                live.put_order(order);
            }
        }

        for (table, rows) in [
            ("members", writes.members.len()),
            ("items", writes.items.len()),
            ("categories", writes.categories.len()),
            ("orders", writes.orders.len()),
        ] {
            if rows > 0 {
                self.log.record(StatementKind::Write, table, rows);
            }
        }
        info!(
            members = writes.members.len(),
            items = writes.items.len(),
            orders = writes.orders.len(),
            "transaction committed"
        );
        Ok(())
    }
}

fn check_versions<K: Ord + Display>(
    entity: &'static str,
    expected: &BTreeMap<K, ExpectedVersion>,
    current: impl Fn(&K) -> Option<u64>,
) -> StoreResult<()> {
    for (id, expected) in expected {
        match (expected, current(id)) {
            (ExpectedVersion::Any, _) => {}
            (ExpectedVersion::Exact(_), None) => {
                warn!(entity, %id, "commit rejected: row removed concurrently");
                return Err(
                    DomainError::conflict(format!("{entity} {id} was removed concurrently")).into(),
                );
            }
            (expected, Some(actual)) => {
                if let Err(err) = expected.check(actual) {
                    warn!(entity, %id, actual, "commit rejected: stale version");
                    return Err(err.into());
                }
            }
        }
    }
    Ok(())
}

fn check_member_names(
    live: &Tables,
    working: &Tables,
    dirty: &BTreeSet<MemberId>,
) -> StoreResult<()> {
    let dirty_members: Vec<&Member> = dirty
        .iter()
        .filter_map(|id| working.members.get(id))
        .collect();
    for member in &dirty_members {
        let clash = live
            .members
            .values()
            .filter(|other| !dirty.contains(&other.id_typed()))
            .chain(dirty_members.iter().copied())
            .any(|other| other.id_typed() != member.id_typed() && other.name() == member.name());
        if clash {
            warn!(name = member.name(), "commit rejected: duplicate member name");
            return Err(DomainError::conflict(format!(
                "member name '{}' is already taken",
                member.name()
            ))
            .into());
        }
    }
    Ok(())
}

fn sync<'k, K, V>(
    live: &mut BTreeMap<K, V>,
    working: &BTreeMap<K, V>,
    ids: impl IntoIterator<Item = &'k K>,
) where
    K: Ord + Copy + 'k,
    V: Clone,
{
    for id in ids {
        match working.get(id) {
            Some(value) => {
                live.insert(*id, value.clone());
            }
            None => {
                live.remove(id);
            }
        }
    }
}
