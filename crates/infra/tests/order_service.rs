use std::sync::Arc;

use orderdesk_core::{Address, DomainError, ItemId, MemberId};
use orderdesk_infra::{
    InMemoryDatastore, ItemService, MemberService, OrderSearch, OrderService, StoreConfig,
    StoreError,
};
use orderdesk_inventory::{Category, Item, ItemChanges};
use orderdesk_members::Member;
use orderdesk_sales::{DeliveryStatus, OrderStatus};

struct Fixture {
    orders: OrderService,
    members: MemberService,
    items: ItemService,
}

fn fixture(config: StoreConfig) -> Fixture {
    let store = Arc::new(InMemoryDatastore::new(config));
    Fixture {
        orders: OrderService::new(store.clone()),
        members: MemberService::new(store.clone()),
        items: ItemService::new(store),
    }
}

fn join(f: &Fixture, name: &str) -> MemberId {
    let member = Member::new(name, Some(Address::new("Seoul", "river", "123-123"))).unwrap();
    f.members.join(member).unwrap()
}

fn book(f: &Fixture, name: &str, price: u64, stock: u32) -> ItemId {
    let item = Item::book(name, price, stock, "kim", "978-0000000000").unwrap();
    f.items.save_item(item).unwrap()
}

fn domain(err: StoreError) -> DomainError {
    err.as_domain().cloned().expect("domain error")
}

#[test]
fn ordering_takes_stock_and_snapshots_price() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 100);

    let order_id = f.orders.order(member, item, 1).unwrap();

    let order = f.orders.find_order(order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::Ordered);
    assert_eq!(order.total_price().unwrap(), 10_000);
    assert_eq!(order.order_items().len(), 1);
    assert_eq!(order.delivery().status(), DeliveryStatus::Ready);
    assert_eq!(order.delivery().address().city(), "Seoul");
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 99);
}

#[test]
fn overflowing_order_total_is_rejected_without_taking_stock() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "GOLD BOOK", u64::MAX / 2, 10);

    let err = domain(f.orders.order(member, item, 3).unwrap_err());
    assert!(matches!(err, DomainError::Validation(_)));
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 10);
    assert!(f.orders.orders_of_member(member).unwrap().is_empty());
}

#[test]
fn cancelling_restores_stock() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 10);
    let order_id = f.orders.order(member, item, 2).unwrap();
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 8);

    f.orders.cancel_order(order_id).unwrap();

    assert_eq!(
        f.orders.find_order(order_id).unwrap().status(),
        OrderStatus::Cancelled
    );
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 10);
}

#[test]
fn ordering_more_than_stock_fails_without_side_effects() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 10);

    let err = f.orders.order(member, item, 11).unwrap_err();

    assert!(matches!(
        domain(err),
        DomainError::InsufficientStock {
            requested: 11,
            available: 10,
            ..
        }
    ));
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 10);
    assert!(f.orders.orders_of_member(member).unwrap().is_empty());
}

#[test]
fn failing_line_rolls_back_the_whole_order() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let plenty = book(&f, "JPA1 BOOK", 10_000, 100);
    let scarce = book(&f, "JPA2 BOOK", 20_000, 1);

    let err = f
        .orders
        .order_many(member, &[(plenty, 5), (scarce, 2)])
        .unwrap_err();

    assert!(matches!(domain(err), DomainError::InsufficientStock { .. }));
    assert_eq!(f.items.find_item(plenty).unwrap().stock_quantity(), 100);
    assert_eq!(f.items.find_item(scarce).unwrap().stock_quantity(), 1);
}

#[test]
fn repeated_item_lines_share_one_stock_row() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 5);

    let order_id = f.orders.order_many(member, &[(item, 2), (item, 3)]).unwrap();

    assert_eq!(f.orders.find_order(order_id).unwrap().total_price().unwrap(), 50_000);
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 0);
}

#[test]
fn unknown_member_or_item_is_not_found() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 5);

    let err = f.orders.order(MemberId::new(), item, 1).unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound { entity: "member", .. }));

    let err = f.orders.order(member, ItemId::new(), 1).unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound { entity: "item", .. }));
}

#[test]
fn cancelling_twice_is_illegal() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 10);
    let order_id = f.orders.order(member, item, 1).unwrap();
    f.orders.cancel_order(order_id).unwrap();

    let err = f.orders.cancel_order(order_id).unwrap_err();

    assert!(matches!(domain(err), DomainError::IllegalState(_)));
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 10);
}

#[test]
fn delivered_orders_cannot_be_cancelled() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 10);
    let order_id = f.orders.order(member, item, 3).unwrap();
    f.orders.start_delivery(order_id).unwrap();
    f.orders.complete_delivery(order_id).unwrap();

    let err = f.orders.cancel_order(order_id).unwrap_err();

    assert!(matches!(domain(err), DomainError::IllegalState(_)));
    let order = f.orders.find_order(order_id).unwrap();
    assert_eq!(order.status(), OrderStatus::Ordered);
    assert_eq!(order.delivery().status(), DeliveryStatus::Delivered);
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 7);
}

#[test]
fn cancelled_orders_cannot_start_delivery() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 10);
    let order_id = f.orders.order(member, item, 1).unwrap();
    f.orders.cancel_order(order_id).unwrap();

    let err = f.orders.start_delivery(order_id).unwrap_err();
    assert!(matches!(domain(err), DomainError::IllegalState(_)));
}

#[test]
fn search_filters_by_status_and_member_name() {
    let f = fixture(StoreConfig::default());
    let a = join(&f, "userA");
    let b = join(&f, "userB");
    let other = join(&f, "kim");
    let item = book(&f, "JPA1 BOOK", 10_000, 100);
    let kept = f.orders.order(a, item, 1).unwrap();
    let cancelled = f.orders.order(b, item, 1).unwrap();
    f.orders.order(other, item, 1).unwrap();
    f.orders.cancel_order(cancelled).unwrap();

    let search = OrderSearch::new()
        .status(OrderStatus::Ordered)
        .member_name("user");
    let found = f.orders.find_orders(&search).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id_typed(), kept);

    let all = f.orders.find_orders(&OrderSearch::new()).unwrap();
    assert_eq!(all.len(), 3);

    let blank_name = OrderSearch::new().member_name("   ");
    assert_eq!(f.orders.find_orders(&blank_name).unwrap().len(), 3);

    let by_status = OrderSearch::new().status(OrderStatus::Cancelled);
    let found = f.orders.find_orders(&by_status).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id_typed(), cancelled);
}

#[test]
fn search_is_capped() {
    let f = fixture(StoreConfig::default().with_max_search_results(3));
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 100);
    for _ in 0..5 {
        f.orders.order(member, item, 1).unwrap();
    }

    assert_eq!(f.orders.find_orders(&OrderSearch::new()).unwrap().len(), 3);
    assert_eq!(f.orders.orders_of_member(member).unwrap().len(), 5);
}

#[test]
fn price_changes_do_not_touch_placed_orders() {
    let f = fixture(StoreConfig::default());
    let member = join(&f, "userA");
    let item = book(&f, "JPA1 BOOK", 10_000, 100);
    let order_id = f.orders.order(member, item, 2).unwrap();

    f.items
        .update_item(
            item,
            ItemChanges {
                name: "JPA1 BOOK (2nd ed.)".to_string(),
                price: 15_000,
                stock_quantity: 50,
            },
        )
        .unwrap();

    let order = f.orders.find_order(order_id).unwrap();
    assert_eq!(order.order_items()[0].order_price(), 10_000);
    assert_eq!(order.total_price().unwrap(), 20_000);

    let second = f.orders.order(member, item, 1).unwrap();
    assert_eq!(f.orders.find_order(second).unwrap().total_price().unwrap(), 15_000);
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 49);
}

#[test]
fn duplicate_member_names_are_rejected_on_join() {
    let f = fixture(StoreConfig::default());
    join(&f, "kim");

    let again = Member::new("kim", None).unwrap();
    let err = f.members.join(again).unwrap_err();

    assert!(matches!(domain(err), DomainError::IllegalState(_)));
    assert_eq!(f.members.find_members().unwrap().len(), 1);
}

#[test]
fn renaming_onto_a_taken_name_is_rejected() {
    let f = fixture(StoreConfig::default());
    join(&f, "kim");
    let lee = join(&f, "lee");

    let err = f.members.rename(lee, "kim").unwrap_err();
    assert!(matches!(domain(err), DomainError::IllegalState(_)));

    f.members.rename(lee, "park").unwrap();
    assert_eq!(f.members.find_member(lee).unwrap().name(), "park");
}

#[test]
fn members_without_address_cannot_order() {
    let f = fixture(StoreConfig::default());
    let member = f.members.join(Member::new("nomad", None).unwrap()).unwrap();
    let item = book(&f, "JPA1 BOOK", 10_000, 10);

    let err = f.orders.order(member, item, 1).unwrap_err();

    assert!(matches!(domain(err), DomainError::Validation(_)));
    assert_eq!(f.items.find_item(item).unwrap().stock_quantity(), 10);
}

#[test]
fn categories_hold_item_ids() {
    let f = fixture(StoreConfig::default());
    let item = book(&f, "JPA1 BOOK", 10_000, 10);
    let category = f.items.save_category(Category::new("books").unwrap()).unwrap();

    f.items.categorize(category, item).unwrap();

    let categories = f.items.find_categories().unwrap();
    assert_eq!(categories.len(), 1);
    assert!(categories[0].contains(item));

    let err = f.items.categorize(category, ItemId::new()).unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound { entity: "item", .. }));
}
