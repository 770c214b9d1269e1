use serde::Serialize;

use super::item::{Item, ItemId};

/// One row of the flattened, rendered list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleItem {
    pub item: Item,
    /// Nesting depth (0 = root)
    pub tier: usize,
    /// Position in the rendered sequence
    pub lazy_list_index: usize,
    /// Direct children, whether or not they are currently shown
    pub number_of_children: usize,
    /// Deepest tier among the visible descendants (own tier when none are shown)
    pub highest_tier_below: usize,
}

impl VisibleItem {
    pub fn has_children(&self) -> bool {
        self.number_of_children > 0
    }
}

/// Find the row for `id` in a flattened list.
pub fn find_visible(list: &[VisibleItem], id: ItemId) -> Option<&VisibleItem> {
    list.iter().find(|v| v.item.id == id)
}
