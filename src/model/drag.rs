use serde::Serialize;

use super::item::ItemId;
use super::visible::VisibleItem;

/// How an in-progress drag is being interpreted.
///
/// A gesture starts `Undecided` and commits to one of the other two exactly
/// once; [`DragMode::decide`] never leaves a decided mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DragMode {
    #[default]
    Undecided,
    Rearrange,
    ChangeTier,
}

impl DragMode {
    /// Resolve the mode from accumulated displacement. Once either axis
    /// reaches `sensitivity` the dominant axis wins; horizontal means a tier
    /// change, vertical (or a tie) means rearranging.
    pub fn decide(self, x_drag: f32, y_drag: f32, sensitivity: f32) -> DragMode {
        if self != DragMode::Undecided {
            return self;
        }
        let (ax, ay) = (x_drag.abs(), y_drag.abs());
        if ax.max(ay) < sensitivity {
            return DragMode::Undecided;
        }
        if ax > ay {
            DragMode::ChangeTier
        } else {
            DragMode::Rearrange
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DragDirection {
    Up,
    Down,
}

/// Identifies the gesture that owns the drag state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DragToken(pub u64);

/// Geometry of one materialized row, as reported by the list renderer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutRow {
    pub item_id: ItemId,
    pub lazy_list_index: usize,
    pub top_offset_px: f32,
    pub height_px: f32,
}

impl LayoutRow {
    pub fn mid_px(&self) -> f32 {
        self.top_offset_px + self.height_px / 2.0
    }
}

/// Snapshot of the active drag, replaced wholesale on every gesture callback.
///
/// `DragState::default()` is the idle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DragState {
    pub dragged_item: Option<VisibleItem>,
    /// Measured pixel height of the dragged row
    pub dragged_item_size: f32,
    /// Top of the dragged row when the gesture started
    pub origin_top_px: f32,
    pub drag_mode: DragMode,
    pub drag_target_index: Option<usize>,
    pub requested_tier_change: i32,
    pub drag_y_direction: Option<DragDirection>,
    pub drag_left_possible: bool,
    pub drag_right_possible: bool,
    pub drag_max_exceeded: bool,
    pub item_above_target: Option<VisibleItem>,
    pub item_below_target: Option<VisibleItem>,
    pub x_drag: f32,
    pub y_drag: f32,
    /// Pointer offset inside the dragged row at press time
    pub y_drag_click_offset: f32,
}

impl DragState {
    pub fn is_active(&self) -> bool {
        self.dragged_item.is_some()
    }

    pub fn dragged_id(&self) -> Option<ItemId> {
        self.dragged_item.as_ref().map(|v| v.item.id)
    }

    /// Vertical center of the dragged row at its current on-screen position.
    pub fn dragged_center_px(&self) -> f32 {
        self.origin_top_px + self.y_drag + self.dragged_item_size / 2.0
    }
}
