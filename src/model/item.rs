use serde::{Deserialize, Serialize};

/// Row id of an item in the store
pub type ItemId = i64;

/// A persisted checklist item.
///
/// `order` is dense and zero-based within the item's sibling group (all items
/// sharing the same `parent_id`). Nesting depth is not stored; it is derived
/// from the parent chain when the tree is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Parent item (None = top level)
    #[serde(default)]
    pub parent_id: Option<ItemId>,
    /// Position within the sibling group
    pub order: i64,
    #[serde(default)]
    pub checked: bool,
    /// Whether children are shown in the flattened list
    #[serde(default = "default_true")]
    pub expanded: bool,
    #[serde(default)]
    pub text: String,
}

fn default_true() -> bool {
    true
}

impl Item {
    /// Create an unchecked, expanded item.
    pub fn new(id: ItemId, parent_id: Option<ItemId>, order: i64, text: impl Into<String>) -> Self {
        Item {
            id,
            parent_id,
            order,
            checked: false,
            expanded: true,
            text: text.into(),
        }
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn with_expanded(mut self, expanded: bool) -> Self {
        self.expanded = expanded;
        self
    }
}

/// Sort items so every sibling group is in ascending `order`, the layout the
/// tree assembler expects. Ties fall back to id so the result is stable.
pub fn sort_for_assembly(items: &mut [Item]) {
    items.sort_by_key(|item| (item.order, item.id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_defaults_on_minimal_record() {
        let item: Item = serde_json::from_str(r#"{"id":4,"order":0}"#).unwrap();
        assert_eq!(item.id, 4);
        assert_eq!(item.parent_id, None);
        assert!(!item.checked);
        assert!(item.expanded);
        assert!(item.text.is_empty());
    }

    #[test]
    fn test_sort_for_assembly_orders_each_group() {
        let mut items = vec![
            Item::new(1, None, 1, "b"),
            Item::new(2, Some(1), 0, "b.a"),
            Item::new(3, None, 0, "a"),
        ];
        sort_for_assembly(&mut items);
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
