//! Property-based tests for the ordering and drag invariants.
//!
//! 1. **Density**: after any sequence of edits every sibling group's orders
//!    are exactly `0..n-1`.
//! 2. **Checked block**: with auto-sort on, no unchecked item follows a
//!    checked sibling.
//! 3. **Round trip**: flattening the assembled forest with collapse ignored
//!    yields every stored id exactly once.
//! 4. **Tier consistency**: flattening assigns each visible item its depth
//!    in the tree, and parents precede their children.
//! 5. **Order independence**: assembling a shuffled copy of the items yields
//!    the same tree.
//! 6. **Excluded subtree**: flattening with an excluded root hides exactly
//!    that root's descendants.
//! 7. **Cancel is a no-op**: any drag followed by cancel leaves the store and
//!    the published state untouched.

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use tiered::io::store::{MemoryStore, OrderStore};
use tiered::model::{Config, DragState, Item, ItemId, LayoutRow, VisibleItem};
use tiered::ops::assemble::assemble_sorted;
use tiered::ops::flatten::{FlattenOptions, flatten, flatten_with};
use tiered::ops::session::ListSession;

#[derive(Debug, Clone)]
enum Edit {
    Add { parent: Option<usize> },
    Check(usize),
    Uncheck(usize),
    Remove(usize),
    Move(usize, usize),
    Tier(usize, i32),
    Toggle(usize),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        4 => proptest::option::of(0usize..64).prop_map(|parent| Edit::Add { parent }),
        2 => (0usize..64).prop_map(Edit::Check),
        1 => (0usize..64).prop_map(Edit::Uncheck),
        1 => (0usize..64).prop_map(Edit::Remove),
        2 => (0usize..64, 0usize..8).prop_map(|(i, to)| Edit::Move(i, to)),
        2 => (0usize..64, prop_oneof![Just(-2), Just(-1), Just(1), Just(2)])
            .prop_map(|(i, d)| Edit::Tier(i, d)),
        1 => (0usize..64).prop_map(Edit::Toggle),
    ]
}

fn pick(session: &ListSession<MemoryStore>, index: usize) -> Option<ItemId> {
    let mut ids: Vec<ItemId> = session.store().items().ok()?.iter().map(|i| i.id).collect();
    if ids.is_empty() {
        return None;
    }
    ids.sort_unstable();
    Some(ids[index % ids.len()])
}

/// Apply an edit, ignoring rejections (depth limits, invalid targets).
fn apply(session: &mut ListSession<MemoryStore>, edit: &Edit) {
    let _ = match *edit {
        Edit::Add { parent } => {
            let parent = parent.and_then(|p| pick(session, p));
            session.add("item", parent, None).map(|_| ())
        }
        Edit::Check(i) => match pick(session, i) {
            Some(id) => session.set_checked(id, true),
            None => Ok(()),
        },
        Edit::Uncheck(i) => match pick(session, i) {
            Some(id) => session.set_checked(id, false),
            None => Ok(()),
        },
        Edit::Remove(i) => match pick(session, i) {
            Some(id) => session.remove(id),
            None => Ok(()),
        },
        Edit::Move(i, to) => match pick(session, i) {
            Some(id) => session.move_sibling(id, to),
            None => Ok(()),
        },
        Edit::Tier(i, delta) => match pick(session, i) {
            Some(id) => session.change_tier(id, delta),
            None => Ok(()),
        },
        Edit::Toggle(i) => match pick(session, i) {
            Some(id) => session.toggle_expanded(id).map(|_| ()),
            None => Ok(()),
        },
    };
}

fn build(edits: &[Edit]) -> ListSession<MemoryStore> {
    let mut session = ListSession::new(MemoryStore::new(), Config::default());
    for edit in edits {
        apply(&mut session, edit);
    }
    session
}

fn groups(items: &[Item]) -> HashMap<Option<ItemId>, Vec<&Item>> {
    let mut map: HashMap<Option<ItemId>, Vec<&Item>> = HashMap::new();
    for item in items {
        map.entry(item.parent_id).or_default().push(item);
    }
    for group in map.values_mut() {
        group.sort_by_key(|i| i.order);
    }
    map
}

fn layout(list: &[VisibleItem]) -> Vec<LayoutRow> {
    list.iter()
        .map(|v| LayoutRow {
            item_id: v.item.id,
            lazy_list_index: v.lazy_list_index,
            top_offset_px: v.lazy_list_index as f32 * 30.0,
            height_px: 30.0,
        })
        .collect()
}

proptest! {
    #[test]
    fn orders_stay_dense(edits in prop::collection::vec(edit_strategy(), 1..40)) {
        let session = build(&edits);
        let items = session.store().items().unwrap();
        for (parent, group) in groups(&items) {
            let orders: Vec<i64> = group.iter().map(|i| i.order).collect();
            let expected: Vec<i64> = (0..group.len() as i64).collect();
            prop_assert_eq!(orders, expected, "group under {:?} is not dense", parent);
        }
        prop_assert!(session.store().table().validate_all().is_ok());
    }

    #[test]
    fn checked_items_form_a_trailing_block(edits in prop::collection::vec(edit_strategy(), 1..40)) {
        let session = build(&edits);
        let items = session.store().items().unwrap();
        for (parent, group) in groups(&items) {
            let first_checked = group.iter().position(|i| i.checked).unwrap_or(group.len());
            prop_assert!(
                group[first_checked..].iter().all(|i| i.checked),
                "unchecked item inside the checked block under {:?}", parent
            );
        }
    }

    #[test]
    fn flatten_of_assemble_recovers_every_id(edits in prop::collection::vec(edit_strategy(), 1..40)) {
        let session = build(&edits);
        let items = session.store().items().unwrap();
        let forest = assemble_sorted(items.clone());
        let list = flatten_with(
            &forest,
            FlattenOptions {
                excluded_subtree_root: None,
                ignore_collapse: true,
            },
        );
        prop_assert_eq!(list.len(), items.len());
        let flattened: BTreeSet<ItemId> = list.iter().map(|v| v.item.id).collect();
        let stored: BTreeSet<ItemId> = items.iter().map(|i| i.id).collect();
        prop_assert_eq!(flattened, stored);
        for v in &list {
            prop_assert_eq!(Some(v.tier), forest.tier_of(v.item.id));
        }
    }

    #[test]
    fn flattened_tiers_match_tree_depth(edits in prop::collection::vec(edit_strategy(), 1..40)) {
        let session = build(&edits);
        let forest = session.forest().unwrap();
        let list = flatten(&forest, None);
        let mut seen = std::collections::HashSet::new();
        for (index, v) in list.iter().enumerate() {
            prop_assert_eq!(v.lazy_list_index, index);
            prop_assert_eq!(Some(v.tier), forest.tier_of(v.item.id));
            prop_assert!(v.tier <= session.config().list.max_tier);
            if let Some(parent) = v.item.parent_id {
                prop_assert!(seen.contains(&parent), "child {} before parent {}", v.item.id, parent);
            }
            seen.insert(v.item.id);
        }
    }

    #[test]
    fn assembly_ignores_arrival_order(
        edits in prop::collection::vec(edit_strategy(), 1..30),
        seed in any::<u64>(),
    ) {
        let session = build(&edits);
        let items = session.store().items().unwrap();
        let mut shuffled = items.clone();
        // Deterministic shuffle from the seed
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }
        let a = assemble_sorted(items);
        let b = assemble_sorted(shuffled);
        prop_assert_eq!(a.roots(), b.roots());
        for &root in a.roots() {
            prop_assert_eq!(a.descendants(root), b.descendants(root));
        }
    }

    #[test]
    fn excluded_subtree_hides_only_descendants(
        edits in prop::collection::vec(edit_strategy(), 1..40),
        which in 0usize..64,
    ) {
        let session = build(&edits);
        let Some(excluded) = pick(&session, which) else {
            return Ok(());
        };
        let forest = session.forest().unwrap();
        let full: Vec<ItemId> = flatten(&forest, None).iter().map(|v| v.item.id).collect();
        let partial: Vec<ItemId> = flatten(&forest, Some(excluded)).iter().map(|v| v.item.id).collect();
        let expected: Vec<ItemId> = full
            .iter()
            .copied()
            .filter(|&id| !forest.is_descendant(id, excluded))
            .collect();
        prop_assert_eq!(partial, expected);
    }

    #[test]
    fn cancelled_drag_changes_nothing(
        edits in prop::collection::vec(edit_strategy(), 1..30),
        which in 0usize..64,
        moves in prop::collection::vec((-120.0f32..120.0, -120.0f32..120.0), 1..12),
    ) {
        let mut session = build(&edits);
        let visible = session.visible().unwrap();
        let Some(id) = visible.get(which % visible.len().max(1)).map(|v| v.item.id) else {
            return Ok(());
        };
        let before = session.store().items().unwrap();
        let revision = session.store().revision();
        let row = layout(&visible).into_iter().find(|r| r.item_id == id).unwrap();

        let token = session.begin_drag(id, row, 10.0).unwrap();
        for (dx, dy) in moves {
            let rows = layout(&session.visible().unwrap());
            let state = session.drag(token, dx, dy, &rows).unwrap();
            if let Some(target) = state.drag_target_index {
                prop_assert!(target < rows.len());
            }
        }
        session.cancel_drag(token);

        prop_assert_eq!(&*session.drag_state(), &DragState::default());
        prop_assert_eq!(session.store().revision(), revision);
        prop_assert_eq!(session.store().items().unwrap(), before);
    }
}
