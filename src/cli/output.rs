use serde::Serialize;

use crate::io::recovery::RecoveryEntry;
use crate::model::drag::{DragMode, DragState};
use crate::model::item::ItemId;
use crate::model::visible::VisibleItem;
use crate::ops::check::{CheckError, CheckResult, CheckWarning};
use crate::ops::order_ops::MutationRequest;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ListJson<'a> {
    pub revision: u64,
    pub items: &'a [VisibleItem],
}

/// Outcome of `tt drag`
#[derive(Serialize)]
pub struct DragJson {
    pub id: ItemId,
    pub mode: DragMode,
    pub target_index: Option<usize>,
    pub requested_tier_change: i32,
    pub max_exceeded: bool,
    pub request: Option<MutationRequest>,
    pub committed: bool,
}

impl DragJson {
    pub fn new(id: ItemId, state: &DragState, request: Option<MutationRequest>, committed: bool) -> Self {
        DragJson {
            id,
            mode: state.drag_mode,
            target_index: state.drag_target_index,
            requested_tier_change: state.requested_tier_change,
            max_exceeded: state.drag_max_exceeded,
            request,
            committed,
        }
    }
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

/// One line per visible row: tier indent, checkbox, text, id, and a count of
/// hidden children when collapsed.
pub fn format_item_line(v: &VisibleItem) -> String {
    let check = if v.item.checked { "x" } else { " " };
    let folded = if !v.item.expanded && v.has_children() {
        format!("  (+{})", v.number_of_children)
    } else {
        String::new()
    };
    format!(
        "{}[{}] {}  #{}{}",
        "  ".repeat(v.tier),
        check,
        v.item.text,
        v.item.id,
        folded
    )
}

pub fn format_list(list: &[VisibleItem]) -> Vec<String> {
    if list.is_empty() {
        return vec!["(empty)".to_string()];
    }
    list.iter().map(format_item_line).collect()
}

pub fn format_request(request: &MutationRequest) -> String {
    match request {
        MutationRequest::MoveSibling { id, to } => format!("move {} to position {}", id, to),
        MutationRequest::Reparent {
            id,
            new_parent: Some(parent),
            ..
        } => format!("move {} under {}", id, parent),
        MutationRequest::Reparent {
            id,
            new_parent: None,
            position,
        } => match position {
            Some(p) => format!("move {} to top level at position {}", id, p),
            None => format!("move {} to top level", id),
        },
    }
}

pub fn format_check_result(result: &CheckResult) -> Vec<String> {
    let mut lines = Vec::new();
    if !result.errors.is_empty() {
        lines.push("Errors:".to_string());
        for err in &result.errors {
            lines.push(format!("  {}", describe_error(err)));
        }
    }
    if !result.warnings.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Warnings:".to_string());
        for warning in &result.warnings {
            lines.push(format!("  {}", describe_warning(warning)));
        }
    }
    if lines.is_empty() {
        lines.push("ok".to_string());
    }
    lines
}

fn group_name(parent_id: Option<ItemId>) -> String {
    match parent_id {
        Some(id) => format!("children of {}", id),
        None => "top level".to_string(),
    }
}

fn describe_error(err: &CheckError) -> String {
    match err {
        CheckError::DuplicateId { id } => format!("id {} is used more than once", id),
        CheckError::DanglingParent {
            parent_id,
            orphan_ids,
        } => format!("missing parent {} for {:?}", parent_id, orphan_ids),
        CheckError::Cycle { ids } => format!("parent cycle through {:?}", ids),
        CheckError::OrderGap { parent_id, orders } => {
            format!("{} has orders {:?}", group_name(*parent_id), orders)
        }
    }
}

fn describe_warning(warning: &CheckWarning) -> String {
    match warning {
        CheckWarning::AutoSortBlock { parent_id, id } => {
            format!("{}: open item {} sits below a checked item", group_name(*parent_id), id)
        }
        CheckWarning::TierOverflow { id, tier, max_tier } => {
            format!("item {} is at tier {} (max {})", id, tier, max_tier)
        }
    }
}

pub fn format_recovery_entry(entry: &RecoveryEntry) -> String {
    entry.to_markdown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::item::Item;
    use crate::ops::assemble::assemble;
    use crate::ops::check::check_items;
    use crate::ops::flatten::flatten;
    use crate::model::config::ListConfig;

    #[test]
    fn test_list_rendering() {
        let forest = assemble(vec![
            Item::new(1, None, 0, "groceries"),
            Item::new(2, Some(1), 0, "milk").with_checked(true),
            Item::new(3, Some(1), 1, "bread"),
            Item::new(4, None, 1, "garage").with_expanded(false),
            Item::new(5, Some(4), 0, "sweep"),
            Item::new(12, None, 2, "call mom"),
        ]);
        let lines = format_list(&flatten(&forest, None));
        insta::assert_snapshot!(lines.join("\n"), @r"
        [ ] groceries  #1
          [x] milk  #2
          [ ] bread  #3
        [ ] garage  #4  (+1)
        [ ] call mom  #12
        ");
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(format_list(&[]), vec!["(empty)"]);
    }

    #[test]
    fn test_request_descriptions() {
        assert_eq!(
            format_request(&MutationRequest::MoveSibling { id: 3, to: 0 }),
            "move 3 to position 0"
        );
        assert_eq!(
            format_request(&MutationRequest::Reparent {
                id: 3,
                new_parent: Some(1),
                position: None
            }),
            "move 3 under 1"
        );
        assert_eq!(
            format_request(&MutationRequest::Reparent {
                id: 3,
                new_parent: None,
                position: Some(2)
            }),
            "move 3 to top level at position 2"
        );
    }

    #[test]
    fn test_check_report() {
        let items = vec![
            Item::new(1, None, 0, "done").with_checked(true),
            Item::new(2, None, 2, "open"),
        ];
        let lines = format_check_result(&check_items(&items, &ListConfig::default()));
        insta::assert_snapshot!(lines.join("\n"), @r"
        Errors:
          top level has orders [0, 2]

        Warnings:
          top level: open item 2 sits below a checked item
        ");
    }
}
