use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::model::config::{Config, DragConfig};
use crate::model::drag::{DragDirection, DragMode, DragState, DragToken, LayoutRow};
use crate::model::item::ItemId;
use crate::model::tree::Forest;
use crate::model::visible::VisibleItem;
use crate::ops::order_ops::MutationRequest;

/// Error type for drag gestures
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DragError {
    #[error("a drag is already in progress ({0:?})")]
    AlreadyActive(DragToken),
    #[error("drag {0:?} is no longer active")]
    StaleToken(DragToken),
}

/// What a finished drag asks the store to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragCommit {
    pub token: DragToken,
    /// Store revision observed when the drag started
    pub base_revision: u64,
    pub request: MutationRequest,
}

/// Read side of the published drag state. Every load returns a complete
/// snapshot; the engine never edits a published value in place.
#[derive(Debug, Clone)]
pub struct DragStateReader {
    cell: Arc<ArcSwap<DragState>>,
}

impl DragStateReader {
    pub fn load(&self) -> Arc<DragState> {
        self.cell.load_full()
    }
}

/// Book-keeping for the gesture that currently owns the drag state
#[derive(Debug)]
struct ActiveDrag {
    token: DragToken,
    /// Tree as of drag start, used to resolve tier changes
    forest: Forest,
    base_revision: u64,
}

/// Turns pointer deltas into drag intents and, on release, a mutation request.
///
/// One gesture at a time: starting a second drag while one is active is
/// rejected, and callbacks carrying a stale token are ignored.
#[derive(Debug)]
pub struct DragEngine {
    config: DragConfig,
    max_tier: usize,
    cell: Arc<ArcSwap<DragState>>,
    active: Option<ActiveDrag>,
    next_token: u64,
}

impl DragEngine {
    pub fn new(config: &Config) -> Self {
        DragEngine {
            config: config.drag.clone(),
            max_tier: config.list.max_tier,
            cell: Arc::new(ArcSwap::from_pointee(DragState::default())),
            active: None,
            next_token: 1,
        }
    }

    pub fn subscribe(&self) -> DragStateReader {
        DragStateReader {
            cell: Arc::clone(&self.cell),
        }
    }

    pub fn state(&self) -> Arc<DragState> {
        self.cell.load_full()
    }

    /// Begin dragging `origin`, whose row currently occupies `origin_row`.
    /// `pointer_offset_y` is where inside the row the pointer went down.
    pub fn on_drag_start(
        &mut self,
        origin: &VisibleItem,
        origin_row: LayoutRow,
        pointer_offset_y: f32,
        forest: &Forest,
        base_revision: u64,
    ) -> Result<DragToken, DragError> {
        if let Some(active) = &self.active {
            return Err(DragError::AlreadyActive(active.token));
        }
        let token = DragToken(self.next_token);
        self.next_token += 1;
        self.active = Some(ActiveDrag {
            token,
            forest: forest.clone(),
            base_revision,
        });
        self.publish(DragState {
            dragged_item: Some(origin.clone()),
            dragged_item_size: origin_row.height_px,
            origin_top_px: origin_row.top_offset_px,
            y_drag_click_offset: pointer_offset_y,
            ..DragState::default()
        });
        tracing::debug!(id = origin.item.id, ?token, "drag started");
        Ok(token)
    }

    /// Accumulate a pointer delta and recompute the intent. `visible` is the
    /// list flattened with the dragged subtree excluded; `layout` is the
    /// geometry of the rows currently materialized. A token that does not
    /// own the drag leaves the state untouched.
    pub fn on_drag(
        &mut self,
        token: DragToken,
        delta_x: f32,
        delta_y: f32,
        visible: &[VisibleItem],
        layout: &[LayoutRow],
    ) -> Result<Arc<DragState>, DragError> {
        let Some(active) = self.active.as_ref().filter(|a| a.token == token) else {
            return Err(DragError::StaleToken(token));
        };
        let prev = self.cell.load_full();
        let Some(dragged) = prev.dragged_item.clone() else {
            return Err(DragError::StaleToken(token));
        };

        let mut next = DragState {
            x_drag: prev.x_drag + delta_x,
            y_drag: prev.y_drag + delta_y,
            ..(*prev).clone()
        };
        let mode = prev
            .drag_mode
            .decide(next.x_drag, next.y_drag, self.config.mode_sensitivity_px);
        if mode != prev.drag_mode {
            tracing::debug!(?mode, x = next.x_drag, y = next.y_drag, "drag mode decided");
        }
        next.drag_mode = mode;

        match mode {
            DragMode::Undecided => {}
            DragMode::Rearrange => rearrange_intent(&mut next, dragged.item.id, visible, layout),
            DragMode::ChangeTier => {
                tier_intent(&mut next, &dragged, &active.forest, &self.config, self.max_tier)
            }
        }

        let next = Arc::new(next);
        self.cell.store(Arc::clone(&next));
        Ok(next)
    }

    /// Finish the gesture. Returns the mutation to commit, if the gesture
    /// resolved to a valid change, and resets the state either way.
    pub fn on_drag_end(&mut self, token: DragToken, visible: &[VisibleItem]) -> Option<DragCommit> {
        if self.active.as_ref().is_none_or(|a| a.token != token) {
            return None;
        }
        let active = self.active.take()?;
        let state = self.cell.load_full();
        self.publish(DragState::default());

        let request = match state.drag_mode {
            DragMode::Rearrange => rearrange_request(&state, visible),
            DragMode::ChangeTier => tier_request(&state, &active.forest),
            DragMode::Undecided => None,
        };
        if request.is_none() {
            tracing::debug!(?token, mode = ?state.drag_mode, "drag ended without a change");
        }
        request.map(|request| DragCommit {
            token,
            base_revision: active.base_revision,
            request,
        })
    }

    /// Abandon the gesture; nothing is emitted.
    pub fn on_drag_cancel(&mut self, token: DragToken) {
        if self.active.as_ref().is_some_and(|a| a.token == token) {
            self.active = None;
            self.publish(DragState::default());
            tracing::debug!(?token, "drag cancelled");
        }
    }

    fn publish(&self, state: DragState) {
        self.cell.store(Arc::new(state));
    }
}

// ---------------------------------------------------------------------------
// Rearrange
// ---------------------------------------------------------------------------

/// Pick the row whose midpoint the dragged row's center has crossed.
fn rearrange_intent(
    state: &mut DragState,
    dragged_id: ItemId,
    visible: &[VisibleItem],
    layout: &[LayoutRow],
) {
    let Some(origin) = visible.iter().position(|v| v.item.id == dragged_id) else {
        clear_target(state);
        return;
    };
    let center = state.dragged_center_px();
    let mut rows: Vec<&LayoutRow> = layout
        .iter()
        .filter(|r| r.lazy_list_index < visible.len() && r.item_id != dragged_id)
        .collect();
    rows.sort_by_key(|r| r.lazy_list_index);

    let mut target = origin;
    for row in rows.iter().filter(|r| r.lazy_list_index > origin) {
        if center > row.mid_px() {
            target = row.lazy_list_index;
        }
    }
    for row in rows.iter().rev().filter(|r| r.lazy_list_index < origin) {
        if center < row.mid_px() {
            target = row.lazy_list_index;
        }
    }

    state.drag_target_index = Some(target);
    state.drag_y_direction = match target.cmp(&origin) {
        std::cmp::Ordering::Less => Some(DragDirection::Up),
        std::cmp::Ordering::Greater => Some(DragDirection::Down),
        std::cmp::Ordering::Equal => None,
    };
    let others: Vec<&VisibleItem> = visible.iter().filter(|v| v.item.id != dragged_id).collect();
    state.item_above_target = target.checked_sub(1).and_then(|i| others.get(i)).map(|v| (*v).clone());
    state.item_below_target = others.get(target).map(|v| (*v).clone());
}

fn clear_target(state: &mut DragState) {
    state.drag_target_index = None;
    state.drag_y_direction = None;
    state.item_above_target = None;
    state.item_below_target = None;
}

/// Translate the target slot into a position inside the dragged item's own
/// sibling group: the number of its siblings that end up above it.
fn rearrange_request(state: &DragState, visible: &[VisibleItem]) -> Option<MutationRequest> {
    let dragged = state.dragged_item.as_ref()?;
    let target = state.drag_target_index?;
    let origin = visible.iter().position(|v| v.item.id == dragged.item.id)?;
    if target == origin || target >= visible.len() {
        return None;
    }
    let to = visible
        .iter()
        .filter(|v| v.item.id != dragged.item.id)
        .take(target)
        .filter(|v| v.item.parent_id == dragged.item.parent_id)
        .count();
    if to as i64 == dragged.item.order {
        return None;
    }
    Some(MutationRequest::MoveSibling {
        id: dragged.item.id,
        to,
    })
}

// ---------------------------------------------------------------------------
// Change tier
// ---------------------------------------------------------------------------

fn tier_intent(
    state: &mut DragState,
    dragged: &VisibleItem,
    forest: &Forest,
    config: &DragConfig,
    max_tier: usize,
) {
    let id = dragged.item.id;
    let tier = dragged.tier as i64;
    let height = forest.subtree_height(id) as i64;
    let max_tier = max_tier as i64;

    let requested = if config.tier_step_px > 0.0 {
        (state.x_drag / config.tier_step_px).round() as i32
    } else {
        0
    };
    let resolved = tier + requested as i64;

    state.requested_tier_change = requested;
    state.drag_left_possible = tier > 0;
    state.drag_right_possible =
        forest.previous_sibling(id).is_some() && tier + 1 + height <= max_tier;
    state.drag_max_exceeded = resolved < 0 || resolved + height > max_tier;
}

fn tier_request(state: &DragState, forest: &Forest) -> Option<MutationRequest> {
    if state.drag_max_exceeded || state.requested_tier_change == 0 {
        return None;
    }
    resolve_tier_change(forest, state.dragged_id()?, state.requested_tier_change)
}

/// Resolve the new parent for a tier change of `delta` steps. Moving right by
/// `k` nests under the previous sibling and then its last children; moving
/// left by `k` places the item right after its `k`-th ancestor. `None` when
/// the tree has no such parent.
pub fn resolve_tier_change(forest: &Forest, id: ItemId, delta: i32) -> Option<MutationRequest> {
    let steps = delta.unsigned_abs() as usize;
    if delta > 0 {
        let mut parent = forest.previous_sibling(id)?;
        for _ in 1..steps {
            parent = forest.last_child(parent)?;
        }
        Some(MutationRequest::Reparent {
            id,
            new_parent: Some(parent),
            position: None,
        })
    } else if delta < 0 {
        let ancestor = forest.ancestor(id, steps)?;
        let pos = forest.siblings_of(ancestor).iter().position(|&s| s == ancestor)?;
        Some(MutationRequest::Reparent {
            id,
            new_parent: forest.item(ancestor)?.parent_id,
            position: Some(pos + 1),
        })
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
