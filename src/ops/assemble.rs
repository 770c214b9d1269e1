use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::model::item::{Item, ItemId, sort_for_assembly};
use crate::model::tree::{DanglingParent, Forest, TreeNode};

/// Build a forest from items in arrival order.
///
/// Children are appended in the order they are processed, so callers that
/// want sibling order to follow `order` must feed each group pre-sorted (see
/// [`assemble_sorted`]). A child may arrive before its parent: it waits in a
/// pending list keyed by the parent id and is attached when the parent shows
/// up. Anything still pending at the end references a parent that never
/// appeared and is left out of the forest.
pub fn assemble(items: impl IntoIterator<Item = Item>) -> Forest {
    let mut nodes: IndexMap<ItemId, TreeNode> = IndexMap::new();
    let mut pending: IndexMap<ItemId, Vec<ItemId>> = IndexMap::new();
    let mut roots = Vec::new();

    for item in items {
        let id = item.id;
        if nodes.contains_key(&id) {
            tracing::warn!(id, "duplicate item id, keeping the first record");
            continue;
        }
        let parent_id = item.parent_id;
        let mut node = TreeNode::new(item);
        // Claim orphans that arrived before this node
        if let Some(waiting) = pending.shift_remove(&id) {
            node.children.extend(waiting);
        }
        nodes.insert(id, node);

        match parent_id {
            None => roots.push(id),
            Some(parent) => match nodes.get_mut(&parent) {
                Some(parent_node) => parent_node.children.push(id),
                None => pending.entry(parent).or_default().push(id),
            },
        }
    }

    let dangling: Vec<DanglingParent> = pending
        .into_iter()
        .map(|(parent_id, orphan_ids)| DanglingParent {
            parent_id,
            orphan_ids,
        })
        .collect();
    for d in &dangling {
        tracing::warn!(
            parent_id = d.parent_id,
            orphans = ?d.orphan_ids,
            "dangling parent reference, omitting orphan subtree"
        );
    }

    let reachable = reachable_from(&nodes, &roots);
    let unreachable: Vec<ItemId> = nodes
        .keys()
        .copied()
        .filter(|id| !reachable.contains(id))
        .collect();
    let orphaned: HashSet<ItemId> = dangling
        .iter()
        .flat_map(|d| d.orphan_ids.iter().copied())
        .collect();
    // Descendants of dangling orphans are expected to be unreachable; what is
    // left over sits on a parent cycle.
    let cyclic: Vec<ItemId> = unreachable
        .iter()
        .copied()
        .filter(|id| !has_ancestor_in(&nodes, *id, &orphaned))
        .collect();
    if !cyclic.is_empty() {
        tracing::warn!(ids = ?cyclic, "parent cycle detected, omitting items");
    }
    nodes.retain(|id, _| reachable.contains(id));

    Forest {
        nodes,
        roots,
        dangling,
        unreachable,
    }
}

/// Sort items into per-group `order` and assemble. The result does not
/// depend on the arrival order of `items`.
pub fn assemble_sorted(mut items: Vec<Item>) -> Forest {
    sort_for_assembly(&mut items);
    assemble(items)
}

fn reachable_from(nodes: &IndexMap<ItemId, TreeNode>, roots: &[ItemId]) -> HashSet<ItemId> {
    let mut seen = HashSet::with_capacity(nodes.len());
    let mut stack: Vec<ItemId> = roots.to_vec();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(node) = nodes.get(&id) {
            stack.extend(node.children.iter().copied());
        }
    }
    seen
}

fn has_ancestor_in(
    nodes: &IndexMap<ItemId, TreeNode>,
    id: ItemId,
    set: &HashSet<ItemId>,
) -> bool {
    let mut visited = HashSet::new();
    let mut current = Some(id);
    while let Some(cur) = current {
        if set.contains(&cur) {
            return true;
        }
        if !visited.insert(cur) {
            return false;
        }
        current = nodes.get(&cur).and_then(|n| n.item.parent_id);
    }
    false
}

/// Group items by parent for the consumers that only need sibling lists.
pub fn children_by_parent(items: &[Item]) -> HashMap<Option<ItemId>, Vec<&Item>> {
    let mut map: HashMap<Option<ItemId>, Vec<&Item>> = HashMap::new();
    for item in items {
        map.entry(item.parent_id).or_default().push(item);
    }
    for group in map.values_mut() {
        group.sort_by_key(|i| (i.order, i.id));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn child(id: ItemId, parent: ItemId, order: i64) -> Item {
        Item::new(id, Some(parent), order, format!("item {}", id))
    }

    fn root(id: ItemId, order: i64) -> Item {
        Item::new(id, None, order, format!("item {}", id))
    }

    #[test]
    fn test_children_append_in_arrival_order() {
        let forest = assemble(vec![child(3, 1, 1), root(1, 0), child(2, 1, 0)]);
        assert_eq!(forest.roots(), &[1]);
        assert_eq!(forest.children(1), &[3, 2]);
        assert!(forest.dangling().is_empty());
    }

    #[test]
    fn test_orphan_chains_resolve_when_root_arrives_last() {
        let forest = assemble(vec![child(4, 3, 0), child(3, 2, 0), child(2, 1, 0), root(1, 0)]);
        assert_eq!(forest.roots(), &[1]);
        assert_eq!(forest.children(1), &[2]);
        assert_eq!(forest.children(2), &[3]);
        assert_eq!(forest.children(3), &[4]);
        assert_eq!(forest.tier_of(4), Some(3));
    }

    #[test]
    fn test_dangling_parent_subtree_is_omitted() {
        let forest = assemble(vec![root(1, 0), child(5, 9, 0), child(6, 5, 0), child(2, 1, 0)]);
        assert_eq!(forest.roots(), &[1]);
        assert_eq!(forest.len(), 2);
        assert!(!forest.contains(5));
        assert!(!forest.contains(6));
        assert_eq!(
            forest.dangling(),
            &[DanglingParent {
                parent_id: 9,
                orphan_ids: vec![5],
            }]
        );
        // Dangling orphans are never promoted to roots
        assert!(!forest.roots().contains(&5));
    }

    #[test]
    fn test_parent_cycle_is_dropped() {
        let forest = assemble(vec![root(1, 0), child(7, 8, 0), child(8, 7, 0)]);
        assert_eq!(forest.roots(), &[1]);
        assert_eq!(forest.len(), 1);
        let mut unreachable = forest.unreachable().to_vec();
        unreachable.sort();
        assert_eq!(unreachable, vec![7, 8]);
    }

    #[test]
    fn test_duplicate_ids_keep_first_record() {
        let mut second = root(1, 0);
        second.text = "shadow".into();
        let forest = assemble(vec![root(1, 0), second]);
        assert_eq!(forest.roots(), &[1]);
        assert_eq!(forest.item(1).unwrap().text, "item 1");
    }

    #[test]
    fn test_sorted_assembly_is_permutation_independent() {
        let items = vec![
            root(1, 1),
            root(2, 0),
            child(3, 1, 1),
            child(4, 1, 0),
            child(5, 4, 0),
        ];
        let mut reversed = items.clone();
        reversed.reverse();
        let a = assemble_sorted(items);
        let b = assemble_sorted(reversed);
        assert_eq!(a.roots(), &[2, 1]);
        assert_eq!(a.children(1), &[4, 3]);
        assert_eq!(a.roots(), b.roots());
        for id in [1, 2, 3, 4, 5] {
            assert_eq!(a.children(id), b.children(id));
        }
    }

    #[test]
    fn test_children_by_parent_sorts_each_group() {
        let items = vec![child(3, 1, 1), root(1, 0), child(2, 1, 0)];
        let groups = children_by_parent(&items);
        let ids: Vec<ItemId> = groups[&Some(1)].iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(groups[&None].len(), 1);
    }
}
