//! Sample data for local runs and benchmarks.

use serde::Serialize;
use tracing::info;

use orderdesk_core::{Address, ItemId, MemberId, OrderId};
use orderdesk_inventory::Item;
use orderdesk_members::Member;
use orderdesk_sales::{Delivery, Order, OrderItem};

use crate::error::StoreResult;
use crate::repository::Repository;
use crate::store::{InMemoryDatastore, Session};

/// Ids created by [`sample_orders`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub members: Vec<MemberId>,
    pub items: Vec<ItemId>,
    pub orders: Vec<OrderId>,
}

/// Two members, each with one two-line order over their own two books.
///
/// - userA: JPA1 BOOK 1 × 10000, JPA2 BOOK 2 × 20000
/// - userB: SPRING1 BOOK 3 × 20000, SPRING2 BOOK 4 × 40000
pub fn sample_orders(store: &InMemoryDatastore) -> StoreResult<SeedSummary> {
    let summary = store.transaction(|tx| {
        let mut summary = SeedSummary {
            members: Vec::new(),
            items: Vec::new(),
            orders: Vec::new(),
        };
        let plans = [
            (
                "userA",
                Address::new("Seoul", "1", "1111"),
                [("JPA1 BOOK", 10_000, 1), ("JPA2 BOOK", 20_000, 2)],
            ),
            (
                "userB",
                Address::new("Busan", "2", "2222"),
                [("SPRING1 BOOK", 20_000, 3), ("SPRING2 BOOK", 40_000, 4)],
            ),
        ];
        for (name, address, books) in plans {
            let order_id = place_sample(tx, name, address, &books, &mut summary)?;
            summary.orders.push(order_id);
        }
        Ok(summary)
    })?;

    info!(
        members = summary.members.len(),
        orders = summary.orders.len(),
        "sample data seeded"
    );
    Ok(summary)
}

/// `members` members, each with one order of `lines_per_order` lines over a
/// shared catalog of `catalog` books.
pub fn bulk_orders(
    store: &InMemoryDatastore,
    members: usize,
    lines_per_order: usize,
    catalog: usize,
) -> StoreResult<SeedSummary> {
    store.transaction(|tx| {
        let mut summary = SeedSummary {
            members: Vec::new(),
            items: Vec::new(),
            orders: Vec::new(),
        };
        let mut books = Vec::with_capacity(catalog.max(1));
        for n in 0..catalog.max(1) {
            let book = Item::book(
                format!("BOOK {n}"),
                1_000 + n as u64,
                u32::MAX / 2,
                "author",
                format!("isbn-{n}"),
            )?;
            summary.items.push(tx.save(book.clone())?);
            books.push(book);
        }
        for n in 0..members {
            let address = Address::new("City", n.to_string(), "00000");
            let member = Member::new(format!("member{n}"), Some(address))?;
            summary.members.push(tx.save(member.clone())?);

            let mut lines = Vec::with_capacity(lines_per_order.max(1));
            for l in 0..lines_per_order.max(1) {
                let slot = (n + l) % books.len();
                let mut book: Item = tx.get(books[slot].id_typed())?;
                let price = book.price();
                lines.push(OrderItem::create(&mut book, price, 1)?);
                tx.save(book)?;
            }
            let order = Order::create(&member, Delivery::to_member(&member)?, lines)?;
            summary.orders.push(tx.save(order)?);
        }
        Ok(summary)
    })
}

fn place_sample(
    tx: &mut Session<'_>,
    name: &str,
    address: Address,
    books: &[(&str, u64, u32)],
    summary: &mut SeedSummary,
) -> StoreResult<OrderId> {
    let member = Member::new(name, Some(address))?;
    summary.members.push(tx.save(member.clone())?);

    let mut lines = Vec::with_capacity(books.len());
    for (title, price, count) in books {
        let mut book = Item::book(*title, *price, 100, "kim", "978-0000000000")?;
        lines.push(OrderItem::create(&mut book, *price, *count)?);
        summary.items.push(tx.save(book)?);
    }

    let order = Order::create(&member, Delivery::to_member(&member)?, lines)?;
    tx.save(order)
}
