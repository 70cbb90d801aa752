//! Application services.
//!
//! Each public operation is one unit of work: it either commits completely
//! or leaves the datastore untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use orderdesk_core::{CategoryId, DomainError, ItemId, MemberId, OrderId};
use orderdesk_inventory::{Category, Item, ItemChanges};
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, Order, OrderItem};

use crate::error::StoreResult;
use crate::fetch::{self, OrderGraph};
use crate::projection::OrderSummary;
use crate::query::{OrderQuery, OrderSearch, Page};
use crate::repository::Repository;
use crate::store::{InMemoryDatastore, Session};

/// Ordering, cancellation and order read paths.
#[derive(Debug, Clone)]
pub struct OrderService {
    store: Arc<InMemoryDatastore>,
}

impl OrderService {
    pub fn new(store: Arc<InMemoryDatastore>) -> Self {
        Self { store }
    }

    /// Place a single-line order for `count` units of `item_id`.
    #[instrument(skip(self), err)]
    pub fn order(&self, member_id: MemberId, item_id: ItemId, count: u32) -> StoreResult<OrderId> {
        self.order_many(member_id, &[(item_id, count)])
    }

    /// Place one order with several lines, priced at each item's current price.
    ///
    /// Any line failing (unknown item, insufficient stock) aborts the whole
    /// order and no stock is taken.
    #[instrument(skip(self), err)]
    pub fn order_many(&self, member_id: MemberId, lines: &[(ItemId, u32)]) -> StoreResult<OrderId> {
        let order_id = self.store.transaction(|tx| {
            let member: Member = tx.get(member_id)?;

            let mut items: BTreeMap<ItemId, Item> = BTreeMap::new();
            for (item_id, _) in lines {
                if !items.contains_key(item_id) {
                    let item: Item = tx.get(*item_id)?;
                    items.insert(*item_id, item);
                }
            }

            let delivery = Delivery::to_member(&member)?;
            let mut order_items = Vec::with_capacity(lines.len());
            for (item_id, count) in lines {
                let item = items
                    .get_mut(item_id)
                    .ok_or_else(|| DomainError::not_found("item", item_id))?;
                let price = item.price();
                order_items.push(OrderItem::create(item, price, *count)?);
            }
            let order = Order::create(&member, delivery, order_items)?;

            for item in items.into_values() {
                tx.save(item)?;
            }
            tx.save(order)
        })?;

        info!(order_id = %order_id, member_id = %member_id, lines = lines.len(), "order placed");
        Ok(order_id)
    }

    /// Cancel an order and return its quantities to stock.
    #[instrument(skip(self), err)]
    pub fn cancel_order(&self, order_id: OrderId) -> StoreResult<()> {
        self.store.transaction(|tx| {
            let mut order: Order = tx.get(order_id)?;
            let item_ids: Vec<ItemId> = order.order_items().iter().map(OrderItem::item_id).collect();
            let mut items: BTreeMap<ItemId, Item> = tx
                .find_items_in(&item_ids)?
                .into_iter()
                .map(|item| (item.id_typed(), item))
                .collect();

            order.cancel(&mut items)?;

            for item in items.into_values() {
                tx.save(item)?;
            }
            tx.save(order)?;
            Ok(())
        })?;

        info!(order_id = %order_id, "order cancelled");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub fn start_delivery(&self, order_id: OrderId) -> StoreResult<()> {
        self.update_order(order_id, Order::start_delivery)
    }

    #[instrument(skip(self), err)]
    pub fn complete_delivery(&self, order_id: OrderId) -> StoreResult<()> {
        self.update_order(order_id, Order::complete_delivery)
    }

    fn update_order(
        &self,
        order_id: OrderId,
        change: impl FnOnce(&mut Order) -> orderdesk_core::DomainResult<()>,
    ) -> StoreResult<()> {
        self.store.transaction(|tx| {
            let mut order: Order = tx.get(order_id)?;
            change(&mut order)?;
            tx.save(order)?;
            Ok(())
        })
    }

    pub fn find_order(&self, order_id: OrderId) -> StoreResult<Order> {
        self.store.read_with(|session| session.get(order_id))
    }

    /// Dynamic search returning complete aggregates.
    #[instrument(skip(self), err)]
    pub fn find_orders(&self, search: &OrderSearch) -> StoreResult<Vec<Order>> {
        self.store.read_with(|session| {
            let rows = session.search(&self.query(search))?;
            session.load_orders(rows)
        })
    }

    /// Orders placed by one member, via the member→orders index.
    pub fn orders_of_member(&self, member_id: MemberId) -> StoreResult<Vec<Order>> {
        self.store.read_with(|session| {
            let rows = session.find_orders_of_member(member_id)?;
            session.load_orders(rows)
        })
    }

    /// Strategy 1 over the search results.
    #[instrument(skip(self), err)]
    pub fn fetch_lazy(&self, search: &OrderSearch) -> StoreResult<Vec<OrderGraph>> {
        self.store
            .read_with(|session| fetch::fetch_lazy(session, &self.query(search)))
    }

    /// Strategy 2, optionally paginated.
    #[instrument(skip(self), err)]
    pub fn fetch_with_member_delivery(
        &self,
        search: &OrderSearch,
        page: Option<Page>,
    ) -> StoreResult<Vec<OrderGraph>> {
        self.store.read_with(|session| {
            let query = self.query(search).fetch_member_delivery();
            match page {
                Some(page) => fetch::fetch_with_member_delivery(session, &query.paginate(page)),
                None => fetch::fetch_with_member_delivery(session, &query),
            }
        })
    }

    /// Strategy 3; never paginated.
    #[instrument(skip(self), err)]
    pub fn fetch_with_items(&self, search: &OrderSearch) -> StoreResult<Vec<OrderGraph>> {
        self.store.read_with(|session| {
            let query = self.query(search).fetch_member_delivery().fetch_order_items();
            fetch::fetch_with_items(session, &query)
        })
    }

    /// Strategy 4, optionally paginated.
    #[instrument(skip(self), err)]
    pub fn find_order_summaries(
        &self,
        search: &OrderSearch,
        page: Option<Page>,
    ) -> StoreResult<Vec<OrderSummary>> {
        self.store.read_with(|session| {
            let query = self.query(search);
            match page {
                Some(page) => fetch::find_order_summaries(session, &query.paginate(page)),
                None => fetch::find_order_summaries(session, &query),
            }
        })
    }

    fn query(&self, search: &OrderSearch) -> OrderQuery {
        OrderQuery::from_search(search, self.store.config().max_search_results)
    }
}

/// Member registration and lookup.
#[derive(Debug, Clone)]
pub struct MemberService {
    store: Arc<InMemoryDatastore>,
}

impl MemberService {
    pub fn new(store: Arc<InMemoryDatastore>) -> Self {
        Self { store }
    }

    /// Register a member whose name is not taken yet.
    ///
    /// The name check and the insert are separate statements, so two
    /// concurrent joins with the same name can both pass the check. Enable
    /// `StoreConfig::unique_member_names` to close that gap at commit.
    #[instrument(skip(self, member), fields(name = member.name()), err)]
    pub fn join(&self, member: Member) -> StoreResult<MemberId> {
        let id = self.store.transaction(|tx| {
            validate_duplicate_member(tx, &member)?;
            tx.save(member)
        })?;
        info!(member_id = %id, "member joined");
        Ok(id)
    }

    #[instrument(skip(self), err)]
    pub fn rename(&self, member_id: MemberId, name: &str) -> StoreResult<()> {
        self.store.transaction(|tx| {
            let mut member: Member = tx.get(member_id)?;
            member.rename(name)?;
            validate_duplicate_member(tx, &member)?;
            tx.save(member)?;
            Ok(())
        })
    }

    pub fn find_members(&self) -> StoreResult<Vec<Member>> {
        self.store.read_with(|session| session.find_all())
    }

    pub fn find_member(&self, member_id: MemberId) -> StoreResult<Member> {
        self.store.read_with(|session| session.get(member_id))
    }
}

fn validate_duplicate_member(session: &Session<'_>, member: &Member) -> StoreResult<()> {
    let taken = session
        .find_members_by_name(member.name())?
        .iter()
        .any(|other| other.id_typed() != member.id_typed());
    if taken {
        return Err(DomainError::illegal_state(format!(
            "member '{}' already exists",
            member.name()
        ))
        .into());
    }
    Ok(())
}

/// Catalog maintenance.
#[derive(Debug, Clone)]
pub struct ItemService {
    store: Arc<InMemoryDatastore>,
}

impl ItemService {
    pub fn new(store: Arc<InMemoryDatastore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, item), fields(name = item.name()), err)]
    pub fn save_item(&self, item: Item) -> StoreResult<ItemId> {
        self.store.transaction(|tx| tx.save(item))
    }

    /// Edit an item in place; existing order lines keep their price snapshot.
    #[instrument(skip(self), err)]
    pub fn update_item(&self, item_id: ItemId, changes: ItemChanges) -> StoreResult<()> {
        self.store.transaction(|tx| {
            let mut item: Item = tx.get(item_id)?;
            item.change(changes)?;
            tx.save(item)?;
            Ok(())
        })
    }

    pub fn find_items(&self) -> StoreResult<Vec<Item>> {
        self.store.read_with(|session| session.find_all())
    }

    pub fn find_item(&self, item_id: ItemId) -> StoreResult<Item> {
        self.store.read_with(|session| session.get(item_id))
    }

    #[instrument(skip(self, category), fields(name = category.name()), err)]
    pub fn save_category(&self, category: Category) -> StoreResult<CategoryId> {
        self.store.transaction(|tx| tx.save(category))
    }

    /// Put an existing item into a category.
    #[instrument(skip(self), err)]
    pub fn categorize(&self, category_id: CategoryId, item_id: ItemId) -> StoreResult<()> {
        self.store.transaction(|tx| {
            let item: Item = tx.get(item_id)?;
            let mut category: Category = tx.get(category_id)?;
            category.add_item(item.id_typed());
            tx.save(category)?;
            Ok(())
        })
    }

    pub fn find_categories(&self) -> StoreResult<Vec<Category>> {
        self.store.read_with(|session| session.find_all())
    }
}
