use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::model::config::ListConfig;
use crate::model::item::{Item, ItemId};
use crate::ops::assemble::{assemble_sorted, children_by_parent};

/// Structured result from `tt verify`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// Something the store should never contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckError {
    DuplicateId { id: ItemId },
    /// Parent id that no item has
    DanglingParent { parent_id: ItemId, orphan_ids: Vec<ItemId> },
    /// Items whose parent chain loops
    Cycle { ids: Vec<ItemId> },
    /// Sibling orders that are not exactly 0..n-1
    OrderGap {
        parent_id: Option<ItemId>,
        orders: Vec<i64>,
    },
}

/// Allowed by the store, but not what the list settings ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckWarning {
    /// An unchecked item sits below a checked sibling
    AutoSortBlock {
        parent_id: Option<ItemId>,
        id: ItemId,
    },
    TierOverflow {
        id: ItemId,
        tier: usize,
        max_tier: usize,
    },
}

/// Validate stored items without modifying them.
pub fn check_items(items: &[Item], config: &ListConfig) -> CheckResult {
    let mut result = CheckResult::default();

    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.id) {
            result.errors.push(CheckError::DuplicateId { id: item.id });
        }
    }

    let forest = assemble_sorted(items.to_vec());
    for d in forest.dangling() {
        result.errors.push(CheckError::DanglingParent {
            parent_id: d.parent_id,
            orphan_ids: d.orphan_ids.clone(),
        });
    }
    let cyclic = cyclic_ids(items);
    if !cyclic.is_empty() {
        result.errors.push(CheckError::Cycle { ids: cyclic });
    }

    let groups: BTreeMap<Option<ItemId>, Vec<&Item>> = children_by_parent(items).into_iter().collect();
    for (parent_id, group) in &groups {
        let orders: Vec<i64> = group.iter().map(|i| i.order).collect();
        if orders.iter().enumerate().any(|(i, &o)| o != i as i64) {
            result.errors.push(CheckError::OrderGap {
                parent_id: *parent_id,
                orders,
            });
        }
        if config.auto_sort {
            let misplaced = group
                .iter()
                .skip_while(|i| !i.checked)
                .filter(|i| !i.checked);
            for item in misplaced {
                result.warnings.push(CheckWarning::AutoSortBlock {
                    parent_id: *parent_id,
                    id: item.id,
                });
            }
        }
    }

    for item in items {
        if let Some(tier) = forest.tier_of(item.id)
            && tier > config.max_tier
        {
            result.warnings.push(CheckWarning::TierOverflow {
                id: item.id,
                tier,
                max_tier: config.max_tier,
            });
        }
    }

    result.valid = result.errors.is_empty();
    result
}

/// Ids that sit on a parent loop, ascending.
fn cyclic_ids(items: &[Item]) -> Vec<ItemId> {
    let parents: HashMap<ItemId, Option<ItemId>> =
        items.iter().map(|i| (i.id, i.parent_id)).collect();
    let mut on_cycle = HashSet::new();
    for item in items {
        let mut path = Vec::new();
        let mut current = Some(item.id);
        while let Some(id) = current {
            if let Some(start) = path.iter().position(|&p| p == id) {
                on_cycle.extend(path[start..].iter().copied());
                break;
            }
            path.push(id);
            current = parents.get(&id).copied().flatten();
        }
    }
    let mut ids: Vec<ItemId> = on_cycle.into_iter().collect();
    ids.sort_unstable();
    ids
}
