use std::sync::{Arc, Barrier};
use std::thread;

use orderdesk_core::{Address, DomainError};
use orderdesk_infra::{
    InMemoryDatastore, ItemService, MemberService, OrderService, Repository, StoreConfig,
};
use orderdesk_inventory::Item;
use orderdesk_members::Member;

#[test]
fn second_writer_on_the_same_item_conflicts() {
    let store = InMemoryDatastore::new(StoreConfig::default());
    let item = Item::book("JPA1 BOOK", 10_000, 10, "kim", "978-0000000000").unwrap();
    let id = store.transaction(|tx| tx.save(item)).unwrap();

    let mut first = store.begin().unwrap();
    let mut second = store.begin().unwrap();

    let mut a: Item = first.get(id).unwrap();
    a.remove_stock(3).unwrap();
    first.save(a).unwrap();

    let mut b: Item = second.get(id).unwrap();
    b.remove_stock(4).unwrap();
    second.save(b).unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(err.is_conflict());

    let stored: Item = store.read().unwrap().get(id).unwrap();
    assert_eq!(stored.stock_quantity(), 7);
}

#[test]
fn concurrent_orders_never_oversell() {
    let store = Arc::new(InMemoryDatastore::new(StoreConfig::default()));
    let members = MemberService::new(store.clone());
    let items = ItemService::new(store.clone());
    let orders = OrderService::new(store.clone());

    let member = members
        .join(Member::new("userA", Some(Address::new("Seoul", "1", "1111"))).unwrap())
        .unwrap();
    let item = items
        .save_item(Item::book("JPA1 BOOK", 10_000, 5, "kim", "978-0000000000").unwrap())
        .unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let orders = orders.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut placed = 0u32;
                for _ in 0..5 {
                    match orders.order(member, item, 1) {
                        Ok(_) => placed += 1,
                        Err(err) => match err.as_domain() {
                            Some(DomainError::Conflict(_))
                            | Some(DomainError::InsufficientStock { .. }) => {}
                            other => panic!("unexpected failure: {other:?}"),
                        },
                    }
                }
                placed
            })
        })
        .collect();
    let placed: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let remaining = items.find_item(item).unwrap().stock_quantity();
    assert_eq!(placed + remaining, 5);
    assert_eq!(
        orders.orders_of_member(member).unwrap().len(),
        placed as usize
    );
}

#[test]
fn unique_member_names_close_the_join_race() {
    let store = InMemoryDatastore::new(StoreConfig::default().with_unique_member_names(true));

    // Both units of work pass the name check before either commits.
    let mut first = store.begin().unwrap();
    let mut second = store.begin().unwrap();
    assert!(first.find_members_by_name("kim").unwrap().is_empty());
    assert!(second.find_members_by_name("kim").unwrap().is_empty());
    first.save(Member::new("kim", None).unwrap()).unwrap();
    second.save(Member::new("kim", None).unwrap()).unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(err.is_conflict());

    let members: Vec<Member> = store.read().unwrap().find_all().unwrap();
    assert_eq!(members.len(), 1);
}

#[test]
fn without_the_constraint_the_join_race_lets_duplicates_in() {
    let store = InMemoryDatastore::new(StoreConfig::default());

    let mut first = store.begin().unwrap();
    let mut second = store.begin().unwrap();
    first.save(Member::new("kim", None).unwrap()).unwrap();
    second.save(Member::new("kim", None).unwrap()).unwrap();
    first.commit().unwrap();
    second.commit().unwrap();

    let members: Vec<Member> = store.read().unwrap().find_all().unwrap();
    assert_eq!(members.len(), 2);
}

#[test]
fn readers_see_only_committed_state() {
    let store = InMemoryDatastore::new(StoreConfig::default());
    let mut tx = store.begin().unwrap();
    let id = tx.save(Member::new("kim", None).unwrap()).unwrap();

    {
        let reader = store.read().unwrap();
        let found: Option<Member> = reader.find(id).unwrap();
        assert!(found.is_none());
    }

    tx.commit().unwrap();
    let found: Option<Member> = store.read().unwrap().find(id).unwrap();
    assert!(found.is_some());
}
