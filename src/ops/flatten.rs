use crate::model::item::ItemId;
use crate::model::tree::Forest;
use crate::model::visible::VisibleItem;

/// Options for [`flatten_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenOptions {
    /// Emit this node but withhold its subtree (the item being dragged)
    pub excluded_subtree_root: Option<ItemId>,
    /// Show children of collapsed nodes too
    pub ignore_collapse: bool,
}

/// Flatten the forest into the rendered sequence, honoring each node's
/// expanded flag.
pub fn flatten(forest: &Forest, excluded_subtree_root: Option<ItemId>) -> Vec<VisibleItem> {
    flatten_with(
        forest,
        FlattenOptions {
            excluded_subtree_root,
            ignore_collapse: false,
        },
    )
}

/// Pre-order walk assigning tiers and `lazy_list_index` values.
pub fn flatten_with(forest: &Forest, options: FlattenOptions) -> Vec<VisibleItem> {
    let mut out = Vec::with_capacity(forest.len());
    for &root in forest.roots() {
        flatten_node(forest, root, 0, &options, &mut out);
    }
    out
}

/// Emit `id` and its visible subtree. Returns the deepest tier emitted.
fn flatten_node(
    forest: &Forest,
    id: ItemId,
    tier: usize,
    options: &FlattenOptions,
    out: &mut Vec<VisibleItem>,
) -> usize {
    let Some(node) = forest.node(id) else {
        return tier;
    };
    let index = out.len();
    out.push(VisibleItem {
        item: node.item.clone(),
        tier,
        lazy_list_index: index,
        number_of_children: node.children.len(),
        highest_tier_below: tier,
    });

    let show_children = (node.item.expanded || options.ignore_collapse)
        && options.excluded_subtree_root != Some(id);
    if !show_children {
        return tier;
    }

    let mut deepest = tier;
    for &child in &node.children {
        deepest = deepest.max(flatten_node(forest, child, tier + 1, options, out));
    }
    out[index].highest_tier_below = deepest;
    deepest
}
