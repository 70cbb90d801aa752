use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use orderdesk_core::{CategoryId, DomainError, DomainResult, Entity, ItemId};

/// Catalog category; owns the many-to-many membership with items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    id: CategoryId,
    name: String,
    parent_id: Option<CategoryId>,
    item_ids: BTreeSet<ItemId>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("category name cannot be empty"));
        }
        Ok(Self {
            id: CategoryId::new(),
            name,
            parent_id: None,
            item_ids: BTreeSet::new(),
        })
    }

    /// Create a sub-category under `parent`.
    pub fn child_of(parent: &Category, name: impl Into<String>) -> DomainResult<Self> {
        let mut child = Self::new(name)?;
        child.parent_id = Some(parent.id);
        Ok(child)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_id(&self) -> Option<CategoryId> {
        self.parent_id
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.item_ids.iter().copied()
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.item_ids.contains(&item_id)
    }

    /// Returns false when the item was already a member.
    pub fn add_item(&mut self, item_id: ItemId) -> bool {
        self.item_ids.insert(item_id)
    }

    pub fn remove_item(&mut self, item_id: ItemId) -> bool {
        self.item_ids.remove(&item_id)
    }
}

impl Entity for Category {
    type Id = CategoryId;
    const NAME: &'static str = "category";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_a_set() {
        let mut books = Category::new("books").unwrap();
        let item = ItemId::new();
        assert!(books.add_item(item));
        assert!(!books.add_item(item));
        assert_eq!(books.item_ids().count(), 1);
        assert!(books.remove_item(item));
        assert!(!books.contains(item));
    }

    #[test]
    fn child_records_parent() {
        let books = Category::new("books").unwrap();
        let novels = Category::child_of(&books, "novels").unwrap();
        assert_eq!(novels.parent_id(), Some(*books.id()));
    }
}
