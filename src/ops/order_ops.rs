use serde::Serialize;

use crate::io::store::{MutationOp, OrderStore, StoreError};
use crate::model::config::ListConfig;
use crate::model::item::{Item, ItemId};
use crate::ops::assemble::assemble_sorted;

/// Attempts per commit before giving up on order invariant failures
pub const MAX_ATTEMPTS: usize = 3;

/// Error type for ordering operations
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("item not found: {0}")]
    NotFound(ItemId),
    #[error("item {id} would reach tier {tier}, deeper than the maximum of {max_tier}")]
    MaxTierExceeded {
        id: ItemId,
        tier: usize,
        max_tier: usize,
    },
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("list changed since the drag started (revision {expected} -> {found})")]
    ConcurrentMutationConflict { expected: u64, found: u64 },
    #[error("transaction still inconsistent after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A structural edit requested by a finished drag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationRequest {
    /// Move within the current sibling group to position `to`
    MoveSibling { id: ItemId, to: usize },
    /// Move under `new_parent`; `position` None picks the auto-sort slot
    Reparent {
        id: ItemId,
        new_parent: Option<ItemId>,
        position: Option<usize>,
    },
}

impl MutationRequest {
    pub fn id(&self) -> ItemId {
        match self {
            MutationRequest::MoveSibling { id, .. } | MutationRequest::Reparent { id, .. } => *id,
        }
    }
}

// ---------------------------------------------------------------------------
// Committing
// ---------------------------------------------------------------------------

/// Plan against the current store state and commit atomically. When the store
/// rejects the result as an order gap or collision, reload and replan.
pub fn transact<S, F>(store: &mut S, mut plan: F) -> Result<(), OrderError>
where
    S: OrderStore + ?Sized,
    F: FnMut(&S) -> Result<Vec<MutationOp>, OrderError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let ops = plan(&*store)?;
        match store.transaction(&ops) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "transaction rejected, retrying from a fresh read");
                store.refresh()?;
            }
            Err(e) if e.is_retryable() => {
                return Err(OrderError::RetriesExhausted {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Insert a new item directly after `target_id` in the target's group.
pub fn insert_after<S: OrderStore + ?Sized>(
    store: &mut S,
    target_id: ItemId,
    text: &str,
) -> Result<ItemId, OrderError> {
    let mut new_id = 0;
    transact(store, |s| {
        let (id, ops) = plan_insert_after(s, target_id, text)?;
        new_id = id;
        Ok(ops)
    })?;
    Ok(new_id)
}

/// Insert a new item under `parent_id`, just above the checked block when
/// auto-sort is on, at the end otherwise.
pub fn insert_respecting_auto_sort<S: OrderStore + ?Sized>(
    store: &mut S,
    parent_id: Option<ItemId>,
    text: &str,
    auto_sort: bool,
) -> Result<ItemId, OrderError> {
    let mut new_id = 0;
    transact(store, |s| {
        let (id, ops) = plan_insert_respecting_auto_sort(s, parent_id, text, auto_sort)?;
        new_id = id;
        Ok(ops)
    })?;
    Ok(new_id)
}

pub fn mark_complete<S: OrderStore + ?Sized>(
    store: &mut S,
    id: ItemId,
    auto_sort: bool,
) -> Result<(), OrderError> {
    transact(store, |s| plan_mark_complete(s, id, auto_sort))
}

pub fn mark_incomplete<S: OrderStore + ?Sized>(
    store: &mut S,
    id: ItemId,
    auto_sort: bool,
) -> Result<(), OrderError> {
    transact(store, |s| plan_mark_incomplete(s, id, auto_sort))
}

/// Delete an item and its whole subtree, closing the gap it leaves.
pub fn remove<S: OrderStore + ?Sized>(store: &mut S, id: ItemId) -> Result<(), OrderError> {
    transact(store, |s| plan_remove(s, id))
}

pub fn move_sibling<S: OrderStore + ?Sized>(
    store: &mut S,
    id: ItemId,
    to: usize,
    auto_sort: bool,
) -> Result<(), OrderError> {
    transact(store, |s| plan_move_sibling(s, id, to, auto_sort))
}

pub fn reparent<S: OrderStore + ?Sized>(
    store: &mut S,
    id: ItemId,
    new_parent: Option<ItemId>,
    position: Option<usize>,
    config: &ListConfig,
) -> Result<(), OrderError> {
    transact(store, |s| plan_reparent(s, id, new_parent, position, config))
}

pub fn set_expanded<S: OrderStore + ?Sized>(
    store: &mut S,
    id: ItemId,
    expanded: bool,
) -> Result<(), OrderError> {
    transact(store, |s| {
        let item = require(s, id)?;
        if item.expanded == expanded {
            return Ok(Vec::new());
        }
        Ok(vec![MutationOp::SetExpanded { id, expanded }])
    })
}

pub fn set_text<S: OrderStore + ?Sized>(
    store: &mut S,
    id: ItemId,
    text: &str,
) -> Result<(), OrderError> {
    transact(store, |s| {
        require(s, id)?;
        Ok(vec![MutationOp::SetText {
            id,
            text: text.to_string(),
        }])
    })
}

/// Apply a drag's request, unless the store moved on since `base_revision`.
pub fn apply_request<S: OrderStore + ?Sized>(
    store: &mut S,
    request: &MutationRequest,
    base_revision: u64,
    config: &ListConfig,
) -> Result<(), OrderError> {
    store.refresh()?;
    let found = store.revision();
    if found != base_revision {
        return Err(OrderError::ConcurrentMutationConflict {
            expected: base_revision,
            found,
        });
    }
    match *request {
        MutationRequest::MoveSibling { id, to } => move_sibling(store, id, to, config.auto_sort),
        MutationRequest::Reparent {
            id,
            new_parent,
            position,
        } => reparent(store, id, new_parent, position, config),
    }
}

/// Fail when a child of `parent_id` would sit deeper than `max_tier`.
pub fn ensure_can_nest<S: OrderStore + ?Sized>(
    store: &S,
    parent_id: Option<ItemId>,
    max_tier: usize,
) -> Result<(), OrderError> {
    let Some(parent) = parent_id else {
        return Ok(());
    };
    let tier = tier_of(store, parent)? + 1;
    if tier > max_tier {
        return Err(OrderError::MaxTierExceeded {
            id: parent,
            tier,
            max_tier,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

pub fn plan_insert_after<S: OrderStore + ?Sized>(
    store: &S,
    target_id: ItemId,
    text: &str,
) -> Result<(ItemId, Vec<MutationOp>), OrderError> {
    let target = require(store, target_id)?;
    let id = store.next_id()?;
    let order = target.order + 1;
    let ops = vec![
        MutationOp::ShiftOrder {
            parent_id: target.parent_id,
            from_order: order,
            delta: 1,
        },
        MutationOp::Insert {
            item: Item::new(id, target.parent_id, order, text),
        },
    ];
    Ok((id, ops))
}

pub fn plan_insert_respecting_auto_sort<S: OrderStore + ?Sized>(
    store: &S,
    parent_id: Option<ItemId>,
    text: &str,
    auto_sort: bool,
) -> Result<(ItemId, Vec<MutationOp>), OrderError> {
    if let Some(parent) = parent_id {
        require(store, parent)?;
    }
    let group = store.read_sibling_group(parent_id)?;
    let order = if auto_sort {
        first_checked_position(&group).unwrap_or(group.len()) as i64
    } else {
        group.len() as i64
    };
    let id = store.next_id()?;
    let ops = vec![
        MutationOp::ShiftOrder {
            parent_id,
            from_order: order,
            delta: 1,
        },
        MutationOp::Insert {
            item: Item::new(id, parent_id, order, text),
        },
    ];
    Ok((id, ops))
}

/// Check an item. With auto-sort the item moves to the end of its group, so
/// checked items form a trailing block in the order they were checked.
pub fn plan_mark_complete<S: OrderStore + ?Sized>(
    store: &S,
    id: ItemId,
    auto_sort: bool,
) -> Result<Vec<MutationOp>, OrderError> {
    let item = require(store, id)?;
    if item.checked {
        return Ok(Vec::new());
    }
    let mut ops = Vec::new();
    if auto_sort {
        let group = store.read_sibling_group(item.parent_id)?;
        let last = group.len() - 1;
        ops.extend(move_ops(&item, group.len(), last));
    }
    ops.push(MutationOp::SetChecked { id, checked: true });
    Ok(ops)
}

/// Uncheck an item. With auto-sort it moves to just above the remaining
/// checked block.
pub fn plan_mark_incomplete<S: OrderStore + ?Sized>(
    store: &S,
    id: ItemId,
    auto_sort: bool,
) -> Result<Vec<MutationOp>, OrderError> {
    let item = require(store, id)?;
    if !item.checked {
        return Ok(Vec::new());
    }
    let mut ops = Vec::new();
    if auto_sort {
        let group = store.read_sibling_group(item.parent_id)?;
        let others = without(&group, id);
        let to = first_checked_position(&others).unwrap_or(others.len());
        ops.extend(move_ops(&item, group.len(), to));
    }
    ops.push(MutationOp::SetChecked { id, checked: false });
    Ok(ops)
}

pub fn plan_remove<S: OrderStore + ?Sized>(
    store: &S,
    id: ItemId,
) -> Result<Vec<MutationOp>, OrderError> {
    let item = require(store, id)?;
    let forest = assemble_sorted(store.items()?);
    let mut ops: Vec<MutationOp> = forest
        .descendants(id)
        .into_iter()
        .map(|d| MutationOp::Delete { id: d })
        .collect();
    ops.push(MutationOp::Delete { id });
    ops.push(MutationOp::ShiftOrder {
        parent_id: item.parent_id,
        from_order: item.order + 1,
        delta: -1,
    });
    Ok(ops)
}

/// Move an item to position `to` within its group. With auto-sort the
/// destination is clamped so the checked block stays contiguous at the end.
pub fn plan_move_sibling<S: OrderStore + ?Sized>(
    store: &S,
    id: ItemId,
    to: usize,
    auto_sort: bool,
) -> Result<Vec<MutationOp>, OrderError> {
    let item = require(store, id)?;
    let group = store.read_sibling_group(item.parent_id)?;
    let others = without(&group, id);
    let to = clamp_destination(&others, item.checked, to, auto_sort);
    Ok(move_ops(&item, group.len(), to))
}

pub fn plan_reparent<S: OrderStore + ?Sized>(
    store: &S,
    id: ItemId,
    new_parent: Option<ItemId>,
    position: Option<usize>,
    config: &ListConfig,
) -> Result<Vec<MutationOp>, OrderError> {
    let item = require(store, id)?;
    if item.parent_id == new_parent {
        let group = store.read_sibling_group(item.parent_id)?;
        let to = position.unwrap_or(group.len() - 1);
        return plan_move_sibling(store, id, to, config.auto_sort);
    }

    let forest = assemble_sorted(store.items()?);
    let new_tier = match new_parent {
        Some(parent) => {
            if parent == id || forest.is_descendant(parent, id) {
                return Err(OrderError::InvalidTarget(format!(
                    "cannot move {} under its own subtree",
                    id
                )));
            }
            require(store, parent)?;
            tier_of(store, parent)? + 1
        }
        None => 0,
    };
    let deepest = new_tier + forest.subtree_height(id);
    if deepest > config.max_tier {
        return Err(OrderError::MaxTierExceeded {
            id,
            tier: deepest,
            max_tier: config.max_tier,
        });
    }

    let target_group = store.read_sibling_group(new_parent)?;
    let wanted = match position {
        Some(p) => p,
        None if item.checked => target_group.len(),
        None => {
            if config.auto_sort {
                first_checked_position(&target_group).unwrap_or(target_group.len())
            } else {
                target_group.len()
            }
        }
    };
    let to = clamp_destination(&target_group, item.checked, wanted, config.auto_sort) as i64;

    Ok(vec![
        MutationOp::ShiftOrder {
            parent_id: item.parent_id,
            from_order: item.order + 1,
            delta: -1,
        },
        MutationOp::ShiftOrder {
            parent_id: new_parent,
            from_order: to,
            delta: 1,
        },
        MutationOp::SetParent {
            id,
            parent_id: new_parent,
        },
        MutationOp::SetOrder { id, order: to },
    ])
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require<S: OrderStore + ?Sized>(store: &S, id: ItemId) -> Result<Item, OrderError> {
    store.get(id)?.ok_or(OrderError::NotFound(id))
}

fn tier_of<S: OrderStore + ?Sized>(store: &S, id: ItemId) -> Result<usize, OrderError> {
    let mut tier = 0;
    let mut current = require(store, id)?;
    while let Some(parent) = current.parent_id {
        current = require(store, parent)?;
        tier += 1;
    }
    Ok(tier)
}

fn without(group: &[Item], id: ItemId) -> Vec<Item> {
    group.iter().filter(|i| i.id != id).cloned().collect()
}

/// Index of the first checked item in an order-sorted group.
fn first_checked_position(group: &[Item]) -> Option<usize> {
    group.iter().position(|i| i.checked)
}

/// Keep unchecked items above the checked block and checked items inside it.
/// `others` is the destination group without the moving item.
fn clamp_destination(others: &[Item], checked: bool, to: usize, auto_sort: bool) -> usize {
    let to = to.min(others.len());
    if !auto_sort {
        return to;
    }
    let boundary = first_checked_position(others).unwrap_or(others.len());
    if checked { to.max(boundary) } else { to.min(boundary) }
}

/// Ops moving `item` from its current order to `to` within a group of
/// `group_len` items. The item is parked past the end first so both shifts
/// can run over the whole group.
fn move_ops(item: &Item, group_len: usize, to: usize) -> Vec<MutationOp> {
    let from = item.order;
    let to = to as i64;
    if from == to {
        return Vec::new();
    }
    vec![
        MutationOp::SetOrder {
            id: item.id,
            order: group_len as i64,
        },
        MutationOp::ShiftOrder {
            parent_id: item.parent_id,
            from_order: from + 1,
            delta: -1,
        },
        MutationOp::ShiftOrder {
            parent_id: item.parent_id,
            from_order: to,
            delta: 1,
        },
        MutationOp::SetOrder {
            id: item.id,
            order: to,
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
