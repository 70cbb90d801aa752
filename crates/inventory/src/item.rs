use serde::{Deserialize, Serialize};

use orderdesk_core::{AggregateRoot, DomainError, DomainResult, Entity, ItemId};

/// Variant-specific catalog payload.
///
/// Persisted in a single table with a `dtype` discriminator column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dtype")]
pub enum ItemKind {
    Book { author: String, isbn: String },
    Album { artist: String, etc: String },
    Movie { director: String, actor: String },
}

impl ItemKind {
    /// Discriminator value stored alongside the row.
    pub fn dtype(&self) -> &'static str {
        match self {
            ItemKind::Book { .. } => "Book",
            ItemKind::Album { .. } => "Album",
            ItemKind::Movie { .. } => "Movie",
        }
    }
}

/// Replacement values for an item edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    pub name: String,
    pub price: u64,
    pub stock_quantity: u32,
}

/// Aggregate root: Item.
///
/// Owns quantity-on-hand. `stock_quantity` is unsigned, and every decrement
/// goes through [`Item::remove_stock`], which refuses to go below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    /// Price in smallest currency unit.
    price: u64,
    stock_quantity: u32,
    kind: ItemKind,
    version: u64,
}

impl Item {
    pub fn new(
        name: impl Into<String>,
        price: u64,
        stock_quantity: u32,
        kind: ItemKind,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        Ok(Self {
            id: ItemId::new(),
            name,
            price,
            stock_quantity,
            kind,
            version: 0,
        })
    }

    pub fn book(
        name: impl Into<String>,
        price: u64,
        stock_quantity: u32,
        author: impl Into<String>,
        isbn: impl Into<String>,
    ) -> DomainResult<Self> {
        Self::new(
            name,
            price,
            stock_quantity,
            ItemKind::Book {
                author: author.into(),
                isbn: isbn.into(),
            },
        )
    }

    /// Rebuild an item from persisted columns.
    pub fn restore(
        id: ItemId,
        name: String,
        price: u64,
        stock_quantity: u32,
        kind: ItemKind,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            price,
            stock_quantity,
            kind,
            version,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn stock_quantity(&self) -> u32 {
        self.stock_quantity
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// Stamp the version assigned by the datastore after a save.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Increase quantity-on-hand (order cancellation, restocking).
    pub fn add_stock(&mut self, quantity: u32) -> DomainResult<()> {
        self.stock_quantity = self
            .stock_quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
        Ok(())
    }

    /// Decrease quantity-on-hand.
    ///
    /// Fails with [`DomainError::InsufficientStock`] and leaves the quantity
    /// untouched when the result would be negative.
    pub fn remove_stock(&mut self, quantity: u32) -> DomainResult<()> {
        let rest = self.stock_quantity.checked_sub(quantity).ok_or_else(|| {
            DomainError::insufficient_stock(&self.name, quantity, self.stock_quantity)
        })?;
        self.stock_quantity = rest;
        Ok(())
    }

    /// Apply an edit in one place instead of field-by-field setters.
    pub fn change(&mut self, changes: ItemChanges) -> DomainResult<()> {
        if changes.name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        self.name = changes.name;
        self.price = changes.price;
        self.stock_quantity = changes.stock_quantity;
        Ok(())
    }
}

impl Entity for Item {
    type Id = ItemId;
    const NAME: &'static str = "item";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Item {
    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_book(stock: u32) -> Item {
        Item::book("JPA Book", 10_000, stock, "kim", "978-0000000000").unwrap()
    }

    #[test]
    fn remove_stock_decrements_quantity() {
        let mut item = test_book(10);
        item.remove_stock(3).unwrap();
        assert_eq!(item.stock_quantity(), 7);
    }

    #[test]
    fn remove_stock_to_exactly_zero_is_allowed() {
        let mut item = test_book(5);
        item.remove_stock(5).unwrap();
        assert_eq!(item.stock_quantity(), 0);
    }

    #[test]
    fn remove_stock_below_zero_is_rejected_and_leaves_quantity() {
        let mut item = test_book(10);
        let err = item.remove_stock(11).unwrap_err();
        match err {
            DomainError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 11);
                assert_eq!(available, 10);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(item.stock_quantity(), 10);
    }

    #[test]
    fn add_stock_overflow_is_rejected() {
        let mut item = test_book(u32::MAX);
        assert!(item.add_stock(1).is_err());
        assert_eq!(item.stock_quantity(), u32::MAX);
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Item::book("  ", 1, 1, "a", "b").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn change_replaces_editable_fields() {
        let mut item = test_book(10);
        item.change(ItemChanges {
            name: "JPA Book 2nd ed.".to_string(),
            price: 12_000,
            stock_quantity: 3,
        })
        .unwrap();
        assert_eq!(item.name(), "JPA Book 2nd ed.");
        assert_eq!(item.price(), 12_000);
        assert_eq!(item.stock_quantity(), 3);
    }

    #[test]
    fn kind_serializes_with_dtype_tag() {
        let item = test_book(1);
        let json = serde_json::to_value(item.kind()).unwrap();
        assert_eq!(json["dtype"], "Book");
        assert_eq!(json["author"], "kim");
        assert_eq!(item.kind().dtype(), "Book");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum StockOp {
            Add(u32),
            Remove(u32),
        }

        fn stock_op() -> impl Strategy<Value = StockOp> {
            prop_oneof![
                (0u32..1_000).prop_map(StockOp::Add),
                (0u32..1_500).prop_map(StockOp::Remove),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: the ledger mirrors a signed model that never goes negative,
            /// and rejected removals leave the quantity unchanged.
            #[test]
            fn stock_never_goes_negative(
                initial in 0u32..1_000,
                ops in prop::collection::vec(stock_op(), 0..50)
            ) {
                let mut item = test_book(initial);
                let mut model = i64::from(initial);

                for op in ops {
                    match op {
                        StockOp::Add(q) => {
                            item.add_stock(q).unwrap();
                            model += i64::from(q);
                        }
                        StockOp::Remove(q) => {
                            let before = item.stock_quantity();
                            if model - i64::from(q) < 0 {
                                prop_assert!(item.remove_stock(q).is_err());
                                prop_assert_eq!(item.stock_quantity(), before);
                            } else {
                                item.remove_stock(q).unwrap();
                                model -= i64::from(q);
                            }
                        }
                    }
                    prop_assert_eq!(i64::from(item.stock_quantity()), model);
                }
            }
        }
    }
}
