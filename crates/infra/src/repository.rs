//! Persistence gateways over a [`Session`].

use std::collections::HashMap;

use orderdesk_core::{
    AggregateRoot, CategoryId, DomainError, Entity, ExpectedVersion, ItemId, MemberId, OrderId,
};
use orderdesk_inventory::{Category, Item};
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, Order, OrderItem};

use crate::error::{StoreError, StoreResult};
use crate::store::{OrderRow, Session, StatementKind};

/// Save / find-by-id gateway for one entity type.
///
/// `save` replaces the whole record (for aggregates, with everything they
/// own). Versioned aggregates must be saved from the version they were read
/// at, otherwise the save fails with `DomainError::Conflict`.
pub trait Repository<E: Entity> {
    fn save(&mut self, entity: E) -> StoreResult<E::Id>;

    fn find(&self, id: E::Id) -> StoreResult<Option<E>>;

    fn find_all(&self) -> StoreResult<Vec<E>>;

    /// Like [`Repository::find`], but a missing row is `NotFound`.
    fn get(&self, id: E::Id) -> StoreResult<E> {
        self.find(id)?
            .ok_or_else(|| DomainError::not_found(E::NAME, id).into())
    }
}

/// Version the stored row must have for `entity` to be saved over it.
fn next_version<E: AggregateRoot>(
    stored: Option<u64>,
    entity: &E,
) -> StoreResult<(u64, ExpectedVersion)> {
    match stored {
        None => Ok((entity.version() + 1, ExpectedVersion::Any)),
        Some(current) => {
            ExpectedVersion::Exact(current).check(entity.version())?;
            Ok((current + 1, ExpectedVersion::Exact(current)))
        }
    }
}

impl Repository<Member> for Session<'_> {
    fn save(&mut self, member: Member) -> StoreResult<MemberId> {
        let (tables, writes) = self.writable()?;
        let id = member.id_typed();
        tables.members.insert(id, member);
        writes.members.insert(id);
        Ok(id)
    }

    fn find(&self, id: MemberId) -> StoreResult<Option<Member>> {
        let found = self.tables().members.get(&id).cloned();
        self.record(StatementKind::FindById, "members", usize::from(found.is_some()));
        Ok(found)
    }

    fn find_all(&self) -> StoreResult<Vec<Member>> {
        let members: Vec<Member> = self.tables().members.values().cloned().collect();
        self.record(StatementKind::Select, "members", members.len());
        Ok(members)
    }
}

impl Repository<Item> for Session<'_> {
    fn save(&mut self, item: Item) -> StoreResult<ItemId> {
        let (tables, writes) = self.writable()?;
        let id = item.id_typed();
        let stored = tables.items.get(&id).map(AggregateRoot::version);
        let (version, expected) = next_version(stored, &item)?;
        tables.items.insert(id, item.with_version(version));
        // Keep the version first read in this unit of work.
        writes.items.entry(id).or_insert(expected);
        Ok(id)
    }

    fn find(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let found = self.tables().items.get(&id).cloned();
        self.record(StatementKind::FindById, "items", usize::from(found.is_some()));
        Ok(found)
    }

    fn find_all(&self) -> StoreResult<Vec<Item>> {
        let items: Vec<Item> = self.tables().items.values().cloned().collect();
        self.record(StatementKind::Select, "items", items.len());
        Ok(items)
    }
}

impl Repository<Category> for Session<'_> {
    fn save(&mut self, category: Category) -> StoreResult<CategoryId> {
        let (tables, writes) = self.writable()?;
        let id = *category.id();
        tables.categories.insert(id, category);
        writes.categories.insert(id);
        Ok(id)
    }

    fn find(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let found = self.tables().categories.get(&id).cloned();
        self.record(StatementKind::FindById, "categories", usize::from(found.is_some()));
        Ok(found)
    }

    fn find_all(&self) -> StoreResult<Vec<Category>> {
        let categories: Vec<Category> = self.tables().categories.values().cloned().collect();
        self.record(StatementKind::Select, "categories", categories.len());
        Ok(categories)
    }
}

/// Orders are stored with their delivery and lines; loading one is a single
/// round trip that reads all three.
impl Repository<Order> for Session<'_> {
    fn save(&mut self, order: Order) -> StoreResult<OrderId> {
        let (tables, writes) = self.writable()?;
        let id = order.id_typed();
        let stored = tables.orders.get(&id).map(|row| row.version);
        let (version, expected) = next_version(stored, &order)?;
        tables.put_order(&order.with_version(version));
        writes.orders.entry(id).or_insert(expected);
        Ok(id)
    }

    fn find(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let tables = self.tables();
        let found = tables
            .orders
            .get(&id)
            .map(|row| tables.assemble_order(row))
            .transpose()?;
        self.record(StatementKind::FindById, "orders", usize::from(found.is_some()));
        Ok(found)
    }

    fn find_all(&self) -> StoreResult<Vec<Order>> {
        let tables = self.tables();
        let orders = tables
            .orders
            .values()
            .map(|row| tables.assemble_order(row))
            .collect::<StoreResult<Vec<_>>>()?;
        self.record(StatementKind::Select, "orders", orders.len());
        Ok(orders)
    }
}

impl Session<'_> {
    /// Cascade-delete an order with its delivery and lines.
    pub fn delete_order(&mut self, order: &Order) -> StoreResult<()> {
        let (tables, writes) = self.writable()?;
        let id = order.id_typed();
        let stored = tables
            .orders
            .get(&id)
            .map(|row| row.version)
            .ok_or_else(|| DomainError::not_found(<Order as Entity>::NAME, id))?;
        ExpectedVersion::Exact(stored).check(order.version())?;
        tables.remove_order(id);
        writes
            .orders
            .entry(id)
            .or_insert(ExpectedVersion::Exact(stored));
        Ok(())
    }

    /// Complete aggregates for already-selected order rows.
    ///
    /// Two batched round trips per chunk: deliveries, then lines.
    pub fn load_orders(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.config().batch_fetch_size.max(1);

        let mut deliveries = HashMap::new();
        let delivery_ids: Vec<_> = rows.iter().map(|row| row.delivery_id).collect();
        for chunk in delivery_ids.chunks(batch) {
            for delivery in self.find_deliveries_in(chunk)? {
                deliveries.insert(delivery.id(), delivery);
            }
        }

        let mut lines: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        let order_ids: Vec<_> = rows.iter().map(|row| row.id).collect();
        for chunk in order_ids.chunks(batch) {
            for line in self.find_order_items_in(chunk)? {
                if let Some(order_id) = line.order_id() {
                    lines.entry(order_id).or_default().push(line);
                }
            }
        }

        rows.into_iter()
            .map(|row| {
                let delivery: Delivery = deliveries.remove(&row.delivery_id).ok_or_else(|| {
                    StoreError::from(DomainError::not_found("delivery", row.delivery_id))
                })?;
                Ok(Order::restore(
                    row.id,
                    row.member_id,
                    lines.remove(&row.id).unwrap_or_default(),
                    delivery,
                    row.order_date,
                    row.status,
                    row.version,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDatastore;
    use orderdesk_core::Address;

    fn member(name: &str) -> Member {
        Member::new(name, Some(Address::new("Seoul", "1", "1111"))).unwrap()
    }

    #[test]
    fn saved_member_is_visible_after_commit_only() {
        let store = InMemoryDatastore::default();
        let mut tx = store.begin().unwrap();
        let id = tx.save(member("userA")).unwrap();
        let inside: Option<Member> = tx.find(id).unwrap();
        assert!(inside.is_some());

        let outside: Option<Member> = store.read().unwrap().find(id).unwrap();
        assert!(outside.is_none());

        tx.commit().unwrap();
        let committed: Member = store.read().unwrap().get(id).unwrap();
        assert_eq!(committed.name(), "userA");
    }

    #[test]
    fn dropped_unit_of_work_discards_changes() {
        let store = InMemoryDatastore::default();
        {
            let mut tx = store.begin().unwrap();
            tx.save(member("userA")).unwrap();
        }
        let all: Vec<Member> = store.read().unwrap().find_all().unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn read_session_rejects_writes() {
        let store = InMemoryDatastore::default();
        let mut session = store.read().unwrap();
        let err = session.save(member("userA")).unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly));
    }

    #[test]
    fn missing_row_is_not_found() {
        let store = InMemoryDatastore::default();
        let session = store.read().unwrap();
        let err = Repository::<Item>::get(&session, ItemId::new()).unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::NotFound { entity: "item", .. })
        ));
    }

    #[test]
    fn item_versions_advance_per_save() {
        let store = InMemoryDatastore::default();
        let book = Item::book("JPA1 Book", 10_000, 100, "kim", "1").unwrap();
        let id = store.transaction(|tx| tx.save(book)).unwrap();

        let first: Item = store.read().unwrap().get(id).unwrap();
        assert_eq!(first.version(), 1);

        store
            .transaction(|tx| {
                let mut item: Item = tx.get(id)?;
                item.remove_stock(1)?;
                tx.save(item)
            })
            .unwrap();
        let second: Item = store.read().unwrap().get(id).unwrap();
        assert_eq!(second.version(), 2);
        assert_eq!(second.stock_quantity(), 99);
    }

    #[test]
    fn stale_copy_in_the_same_unit_of_work_conflicts() {
        let store = InMemoryDatastore::default();
        let book = Item::book("book", 1, 10, "kim", "1").unwrap();
        let id = store.transaction(|tx| tx.save(book)).unwrap();

        let mut tx = store.begin().unwrap();
        let stale: Item = tx.get(id).unwrap();
        tx.save(stale.clone()).unwrap();
        let err = tx.save(stale).unwrap_err();
        assert!(err.is_conflict());
    }
}
