use indexmap::IndexMap;

use super::item::{Item, ItemId};

/// A node in the assembled tree. Children are held as ids into the owning
/// [`Forest`], never as references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub item: Item,
    pub children: Vec<ItemId>,
}

impl TreeNode {
    pub fn new(item: Item) -> Self {
        TreeNode {
            item,
            children: Vec::new(),
        }
    }
}

/// Items whose declared parent never appeared in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingParent {
    pub parent_id: ItemId,
    /// Orphans that were waiting on `parent_id`, in arrival order
    pub orphan_ids: Vec<ItemId>,
}

/// Arena of tree nodes keyed by item id, plus the ordered list of roots.
///
/// Only nodes reachable from a root are kept. Subtrees hanging off a missing
/// parent are reported in `dangling`, and nodes caught in a parent cycle are
/// reported in `unreachable`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forest {
    pub(crate) nodes: IndexMap<ItemId, TreeNode>,
    pub(crate) roots: Vec<ItemId>,
    pub(crate) dangling: Vec<DanglingParent>,
    pub(crate) unreachable: Vec<ItemId>,
}

impl Forest {
    pub fn roots(&self) -> &[ItemId] {
        &self.roots
    }

    pub fn dangling(&self) -> &[DanglingParent] {
        &self.dangling
    }

    pub fn unreachable(&self) -> &[ItemId] {
        &self.unreachable
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: ItemId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.nodes.get(&id).map(|n| &n.item)
    }

    pub fn children(&self, id: ItemId) -> &[ItemId] {
        self.nodes.get(&id).map_or(&[], |n| n.children.as_slice())
    }

    /// The sibling group an item belongs to, in tree order.
    pub fn siblings_of(&self, id: ItemId) -> &[ItemId] {
        match self.item(id).and_then(|i| i.parent_id) {
            Some(parent) => self.children(parent),
            None => &self.roots,
        }
    }

    /// Nesting depth of `id` (0 for roots).
    pub fn tier_of(&self, id: ItemId) -> Option<usize> {
        let mut tier = 0;
        let mut current = self.item(id)?;
        while let Some(parent) = current.parent_id {
            current = self.item(parent)?;
            tier += 1;
        }
        Some(tier)
    }

    /// How many levels the subtree below `id` extends (0 for a leaf).
    pub fn subtree_height(&self, id: ItemId) -> usize {
        self.children(id)
            .iter()
            .map(|&child| 1 + self.subtree_height(child))
            .max()
            .unwrap_or(0)
    }

    /// All descendants of `id` in pre-order, excluding `id` itself.
    pub fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut stack: Vec<ItemId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn is_descendant(&self, id: ItemId, ancestor: ItemId) -> bool {
        let mut current = self.item(id).and_then(|i| i.parent_id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.item(parent).and_then(|i| i.parent_id);
        }
        false
    }

    /// The sibling directly above `id` in its group.
    pub fn previous_sibling(&self, id: ItemId) -> Option<ItemId> {
        let siblings = self.siblings_of(id);
        let pos = siblings.iter().position(|&s| s == id)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    pub fn last_child(&self, id: ItemId) -> Option<ItemId> {
        self.children(id).last().copied()
    }

    /// The ancestor `levels` steps up (1 = parent).
    pub fn ancestor(&self, id: ItemId, levels: usize) -> Option<ItemId> {
        let mut current = id;
        for _ in 0..levels {
            current = self.item(current)?.parent_id?;
        }
        Some(current)
    }
}
