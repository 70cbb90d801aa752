use std::collections::BTreeSet;
use std::sync::RwLockReadGuard;

use orderdesk_core::{DeliveryId, ItemId, MemberId, OrderId};
use orderdesk_inventory::Item;
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, OrderItem};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::projection::OrderSummary;
use crate::query::{CollectionFetch, OrderQuery, Plain, ToOneFetch, Unpaged};

use super::{
    CollectionRow, InMemoryDatastore, OrderRow, StatementKind, Tables, ToOneRow, WriteSet,
};

enum View<'a> {
    Shared(RwLockReadGuard<'a, Tables>),
    Working(Box<Tables>),
}

/// A datastore session: either a shared read view or a unit of work.
///
/// Every query method is one round trip and is recorded in the store's
/// [`super::QueryLog`].
pub struct Session<'a> {
    store: &'a InMemoryDatastore,
    view: View<'a>,
    writes: Option<WriteSet>,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

impl<'a> Session<'a> {
    pub(super) fn reading(
        store: &'a InMemoryDatastore,
        guard: RwLockReadGuard<'a, Tables>,
    ) -> Self {
        Self {
            store,
            view: View::Shared(guard),
            writes: None,
        }
    }

    pub(super) fn writing(store: &'a InMemoryDatastore, tables: Tables) -> Self {
        Self {
            store,
            view: View::Working(Box::new(tables)),
            writes: Some(WriteSet::default()),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_none()
    }

    pub fn config(&self) -> &StoreConfig {
        self.store.config()
    }

    /// Publish the unit of work. A no-op for read sessions.
    pub fn commit(self) -> StoreResult<()> {
        let Session {
            store,
            view,
            writes,
        } = self;
        match (view, writes) {
            (View::Working(tables), Some(writes)) => store.apply(*tables, writes),
            _ => Ok(()),
        }
    }

    pub(crate) fn tables(&self) -> &Tables {
        match &self.view {
            View::Shared(guard) => guard,
            View::Working(tables) => tables,
        }
    }

    pub(crate) fn writable(&mut self) -> StoreResult<(&mut Tables, &mut WriteSet)> {
        match (&mut self.view, &mut self.writes) {
            (View::Working(tables), Some(writes)) => Ok((tables.as_mut(), writes)),
            _ => Err(StoreError::ReadOnly),
        }
    }

    pub(crate) fn record(&self, kind: StatementKind, table: &'static str, rows: usize) {
        self.store.query_log().record(kind, table, rows);
    }

    /// Orders joined to their member and filtered by the query predicates,
    /// in ascending order id.
    fn joined<'s, F, P>(
        &'s self,
        query: &'s OrderQuery<F, P>,
    ) -> impl Iterator<Item = (&'s OrderRow, &'s Member)> {
        let tables = self.tables();
        tables
            .orders
            .values()
            .filter_map(move |row| tables.members.get(&row.member_id).map(|m| (row, m)))
            .filter(move |(row, member)| query.accepts(row, member))
    }

    // -------------------------------------------------------------------------
    // Single-table lookups
    // -------------------------------------------------------------------------

    pub fn find_delivery(&self, id: DeliveryId) -> StoreResult<Option<Delivery>> {
        let found = self.tables().deliveries.get(&id).cloned();
        self.record(StatementKind::FindById, "deliveries", usize::from(found.is_some()));
        Ok(found)
    }

    /// Lines of one order (the lazy path issues this once per order).
    pub fn find_order_items(&self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
        let lines: Vec<OrderItem> = self.tables().lines_of(order_id).cloned().collect();
        self.record(StatementKind::Select, "order_items", lines.len());
        Ok(lines)
    }

    /// `order_items WHERE order_id IN (...)`, grouped by order in key order.
    pub fn find_order_items_in(&self, order_ids: &[OrderId]) -> StoreResult<Vec<OrderItem>> {
        let keys: BTreeSet<OrderId> = order_ids.iter().copied().collect();
        let tables = self.tables();
        let lines: Vec<OrderItem> = keys
            .iter()
            .flat_map(|id| tables.lines_of(*id).cloned())
            .collect();
        self.record(StatementKind::SelectIn, "order_items", lines.len());
        Ok(lines)
    }

    /// `items WHERE id IN (...)`; unknown ids are skipped.
    pub fn find_items_in(&self, ids: &[ItemId]) -> StoreResult<Vec<Item>> {
        let keys: BTreeSet<ItemId> = ids.iter().copied().collect();
        let tables = self.tables();
        let items: Vec<Item> = keys
            .iter()
            .filter_map(|id| tables.items.get(id).cloned())
            .collect();
        self.record(StatementKind::SelectIn, "items", items.len());
        Ok(items)
    }

    pub fn find_deliveries_in(&self, ids: &[DeliveryId]) -> StoreResult<Vec<Delivery>> {
        let keys: BTreeSet<DeliveryId> = ids.iter().copied().collect();
        let tables = self.tables();
        let deliveries: Vec<Delivery> = keys
            .iter()
            .filter_map(|id| tables.deliveries.get(id).cloned())
            .collect();
        self.record(StatementKind::SelectIn, "deliveries", deliveries.len());
        Ok(deliveries)
    }

    pub fn find_members_by_name(&self, name: &str) -> StoreResult<Vec<Member>> {
        let members: Vec<Member> = self
            .tables()
            .members
            .values()
            .filter(|m| m.name() == name)
            .cloned()
            .collect();
        self.record(StatementKind::Select, "members", members.len());
        Ok(members)
    }

    /// Order rows of one member, through the member→orders index.
    pub fn find_orders_of_member(&self, member_id: MemberId) -> StoreResult<Vec<OrderRow>> {
        let tables = self.tables();
        let rows: Vec<OrderRow> = tables
            .order_ids_of(member_id)
            .filter_map(|id| tables.orders.get(&id).cloned())
            .collect();
        self.record(StatementKind::Select, "orders", rows.len());
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Order queries
    // -------------------------------------------------------------------------

    /// Order rows only; associations are left for the caller to load.
    pub fn search<P>(&self, query: &OrderQuery<Plain, P>) -> StoreResult<Vec<OrderRow>> {
        let rows: Vec<OrderRow> = self
            .joined(query)
            .skip(query.first_result())
            .take(query.max_results())
            .map(|(row, _)| row.clone())
            .collect();
        self.record(StatementKind::Select, "orders", rows.len());
        Ok(rows)
    }

    /// Orders with member and delivery in the same statement.
    pub fn search_fetch_to_one<P>(
        &self,
        query: &OrderQuery<ToOneFetch, P>,
    ) -> StoreResult<Vec<ToOneRow>> {
        let tables = self.tables();
        let rows: Vec<ToOneRow> = self
            .joined(query)
            .filter_map(|(row, member)| {
                tables.deliveries.get(&row.delivery_id).map(|delivery| ToOneRow {
                    order: row.clone(),
                    member: member.clone(),
                    delivery: delivery.clone(),
                })
            })
            .skip(query.first_result())
            .take(query.max_results())
            .collect();
        self.record(StatementKind::JoinFetch, "orders", rows.len());
        Ok(rows)
    }

    /// Orders exploded per line, joined with everything down to the item.
    ///
    /// No row limit is applied here: limiting exploded rows would cut orders
    /// in half. The cap is applied by the caller after deduplication.
    pub fn search_fetch_collection(
        &self,
        query: &OrderQuery<CollectionFetch, Unpaged>,
    ) -> StoreResult<Vec<CollectionRow>> {
        let tables = self.tables();
        let mut rows = Vec::new();
        for (order, member) in self.joined(query) {
            let Some(delivery) = tables.deliveries.get(&order.delivery_id) else {
                continue;
            };
            for line in tables.lines_of(order.id) {
                let Some(item) = tables.items.get(&line.item_id()) else {
                    continue;
                };
                rows.push(CollectionRow {
                    order: order.clone(),
                    member: member.clone(),
                    delivery: delivery.clone(),
                    line: line.clone(),
                    item: item.clone(),
                });
            }
        }
        self.record(StatementKind::JoinFetchCollection, "orders", rows.len());
        Ok(rows)
    }

    /// Flat projection straight from the joined columns.
    pub fn select_summaries<P>(
        &self,
        query: &OrderQuery<Plain, P>,
    ) -> StoreResult<Vec<OrderSummary>> {
        let tables = self.tables();
        let rows: Vec<OrderSummary> = self
            .joined(query)
            .filter_map(|(row, member)| {
                tables.deliveries.get(&row.delivery_id).map(|delivery| OrderSummary {
                    order_id: row.id,
                    member_name: member.name().to_string(),
                    order_date: row.order_date,
                    order_status: row.status,
                    address: delivery.address().clone(),
                })
            })
            .skip(query.first_result())
            .take(query.max_results())
            .collect();
        self.record(StatementKind::Projection, "orders", rows.len());
        Ok(rows)
    }
}
