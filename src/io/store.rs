use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::item::{Item, ItemId};

/// One step of a store transaction.
///
/// Steps run in sequence against a working copy. Intermediate states may be
/// inconsistent; the store validates only the final state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationOp {
    /// Add `delta` to the order of every item in the group with `order >= from_order`
    ShiftOrder {
        parent_id: Option<ItemId>,
        from_order: i64,
        delta: i64,
    },
    SetOrder {
        id: ItemId,
        order: i64,
    },
    SetParent {
        id: ItemId,
        parent_id: Option<ItemId>,
    },
    SetChecked {
        id: ItemId,
        checked: bool,
    },
    SetExpanded {
        id: ItemId,
        expanded: bool,
    },
    SetText {
        id: ItemId,
        text: String,
    },
    Delete {
        id: ItemId,
    },
    Insert {
        item: Item,
    },
}

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(ItemId),
    #[error("item id {0} already exists")]
    DuplicateId(ItemId),
    #[error("order gap or collision under parent {parent_id:?}: {orders:?}")]
    OrderInvariant {
        parent_id: Option<ItemId>,
        orders: Vec<i64>,
    },
    #[error("item {id} references missing parent {parent_id}")]
    DanglingParent { id: ItemId, parent_id: ItemId },
    #[error("moving item {0} would create a parent cycle")]
    Cycle(ItemId),
    #[error("list changed on disk (read revision {expected}, found {found})")]
    StaleRevision { expected: u64, found: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse item file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Lock(#[from] crate::io::lock::LockError),
}

impl StoreError {
    /// Errors that a fresh read and a recomputed plan may resolve
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::OrderInvariant { .. } | StoreError::StaleRevision { .. }
        )
    }
}

/// Transactional access to ordered sibling groups.
pub trait OrderStore {
    /// Every item, in no particular order.
    fn items(&self) -> Result<Vec<Item>, StoreError>;

    fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Items sharing `parent_id`, sorted by `order`.
    fn read_sibling_group(&self, parent_id: Option<ItemId>) -> Result<Vec<Item>, StoreError>;

    /// An id no existing item uses.
    fn next_id(&self) -> Result<ItemId, StoreError>;

    /// Incremented once per committed transaction.
    fn revision(&self) -> u64;

    /// Apply all ops or none.
    fn transaction(&mut self, ops: &[MutationOp]) -> Result<(), StoreError>;

    /// Reload from the backing medium before a retry.
    fn refresh(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory table shared by the store implementations
// ---------------------------------------------------------------------------

/// Rows keyed by id, with the op interpreter and invariant checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemTable {
    rows: IndexMap<ItemId, Item>,
}

impl ItemTable {
    /// Load rows without validation; use [`ItemTable::validate_all`] to check them.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        ItemTable {
            rows: items.into_iter().map(|item| (item.id, item)).collect(),
        }
    }

    pub fn items(&self) -> Vec<Item> {
        self.rows.values().cloned().collect()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.rows.get(&id)
    }

    pub fn group(&self, parent_id: Option<ItemId>) -> Vec<Item> {
        let mut group: Vec<Item> = self
            .rows
            .values()
            .filter(|i| i.parent_id == parent_id)
            .cloned()
            .collect();
        group.sort_by_key(|i| (i.order, i.id));
        group
    }

    pub fn next_id(&self) -> ItemId {
        self.rows.keys().copied().max().unwrap_or(0) + 1
    }

    /// Run `ops` against a copy and return it if the result is consistent.
    pub fn apply_all(&self, ops: &[MutationOp]) -> Result<ItemTable, StoreError> {
        let mut work = self.clone();
        let mut touched = BTreeSet::new();
        let mut reparented = Vec::new();
        for op in ops {
            work.apply(op, &mut touched, &mut reparented)?;
        }
        for id in reparented {
            if work.rows.contains_key(&id) && work.has_cycle_through(id) {
                return Err(StoreError::Cycle(id));
            }
        }
        work.validate_parents()?;
        for parent_id in touched {
            work.validate_group(parent_id)?;
        }
        Ok(work)
    }

    fn apply(
        &mut self,
        op: &MutationOp,
        touched: &mut BTreeSet<Option<ItemId>>,
        reparented: &mut Vec<ItemId>,
    ) -> Result<(), StoreError> {
        match op {
            MutationOp::ShiftOrder {
                parent_id,
                from_order,
                delta,
            } => {
                for item in self.rows.values_mut() {
                    if item.parent_id == *parent_id && item.order >= *from_order {
                        item.order += delta;
                    }
                }
                touched.insert(*parent_id);
            }
            MutationOp::SetOrder { id, order } => {
                let item = self.row_mut(*id)?;
                item.order = *order;
                touched.insert(item.parent_id);
            }
            MutationOp::SetParent { id, parent_id } => {
                let item = self.row_mut(*id)?;
                touched.insert(item.parent_id);
                item.parent_id = *parent_id;
                touched.insert(*parent_id);
                reparented.push(*id);
            }
            MutationOp::SetChecked { id, checked } => {
                self.row_mut(*id)?.checked = *checked;
            }
            MutationOp::SetExpanded { id, expanded } => {
                self.row_mut(*id)?.expanded = *expanded;
            }
            MutationOp::SetText { id, text } => {
                self.row_mut(*id)?.text = text.clone();
            }
            MutationOp::Delete { id } => {
                let item = self
                    .rows
                    .shift_remove(id)
                    .ok_or(StoreError::NotFound(*id))?;
                touched.insert(item.parent_id);
            }
            MutationOp::Insert { item } => {
                if self.rows.contains_key(&item.id) {
                    return Err(StoreError::DuplicateId(item.id));
                }
                touched.insert(item.parent_id);
                self.rows.insert(item.id, item.clone());
            }
        }
        Ok(())
    }

    fn row_mut(&mut self, id: ItemId) -> Result<&mut Item, StoreError> {
        self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))
    }

    fn has_cycle_through(&self, id: ItemId) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            if !seen.insert(cur) {
                return true;
            }
            current = self.rows.get(&cur).and_then(|i| i.parent_id);
        }
        false
    }

    fn validate_parents(&self) -> Result<(), StoreError> {
        for item in self.rows.values() {
            if let Some(parent_id) = item.parent_id
                && !self.rows.contains_key(&parent_id)
            {
                return Err(StoreError::DanglingParent {
                    id: item.id,
                    parent_id,
                });
            }
        }
        Ok(())
    }

    /// The group's orders must be exactly `0..n`.
    pub fn validate_group(&self, parent_id: Option<ItemId>) -> Result<(), StoreError> {
        let mut orders: Vec<i64> = self
            .rows
            .values()
            .filter(|i| i.parent_id == parent_id)
            .map(|i| i.order)
            .collect();
        orders.sort_unstable();
        let dense = orders.iter().enumerate().all(|(i, &o)| o == i as i64);
        if dense {
            Ok(())
        } else {
            Err(StoreError::OrderInvariant { parent_id, orders })
        }
    }

    /// Check every group plus parent references and cycles.
    pub fn validate_all(&self) -> Result<(), StoreError> {
        self.validate_parents()?;
        for id in self.rows.keys() {
            if self.has_cycle_through(*id) {
                return Err(StoreError::Cycle(*id));
            }
        }
        let parents: BTreeSet<Option<ItemId>> = self.rows.values().map(|i| i.parent_id).collect();
        for parent_id in parents {
            self.validate_group(parent_id)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: ItemTable,
    revision: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store; the rows must already satisfy the store invariants.
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Result<Self, StoreError> {
        let table = ItemTable::from_items(items);
        table.validate_all()?;
        Ok(MemoryStore { table, revision: 0 })
    }

    pub fn table(&self) -> &ItemTable {
        &self.table
    }
}

impl OrderStore for MemoryStore {
    fn items(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.table.items())
    }

    fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.table.get(id).cloned())
    }

    fn read_sibling_group(&self, parent_id: Option<ItemId>) -> Result<Vec<Item>, StoreError> {
        Ok(self.table.group(parent_id))
    }

    fn next_id(&self) -> Result<ItemId, StoreError> {
        Ok(self.table.next_id())
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn transaction(&mut self, ops: &[MutationOp]) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        self.table = self.table.apply_all(ops)?;
        self.revision += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> MemoryStore {
        MemoryStore::with_items(vec![
            Item::new(1, None, 0, "a"),
            Item::new(2, None, 1, "b"),
            Item::new(3, Some(1), 0, "a.1"),
        ])
        .unwrap()
    }

    fn orders(store: &MemoryStore, parent: Option<ItemId>) -> Vec<(ItemId, i64)> {
        store
            .read_sibling_group(parent)
            .unwrap()
            .iter()
            .map(|i| (i.id, i.order))
            .collect()
    }

    #[test]
    fn test_seed_rejects_gaps() {
        let result = MemoryStore::with_items(vec![Item::new(1, None, 0, "a"), Item::new(2, None, 2, "b")]);
        assert!(matches!(result, Err(StoreError::OrderInvariant { .. })));
    }

    #[test]
    fn test_shift_then_insert_commits() {
        let mut store = store();
        store
            .transaction(&[
                MutationOp::ShiftOrder {
                    parent_id: None,
                    from_order: 1,
                    delta: 1,
                },
                MutationOp::Insert {
                    item: Item::new(4, None, 1, "new"),
                },
            ])
            .unwrap();
        assert_eq!(orders(&store, None), vec![(1, 0), (4, 1), (2, 2)]);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_failed_transaction_leaves_store_untouched() {
        let mut store = store();
        let before = store.table().clone();
        let result = store.transaction(&[MutationOp::Insert {
            item: Item::new(4, None, 5, "gap"),
        }]);
        assert!(matches!(result, Err(StoreError::OrderInvariant { parent_id: None, .. })));
        assert_eq!(store.table(), &before);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_deleting_a_parent_with_children_is_rejected() {
        let mut store = store();
        let result = store.transaction(&[
            MutationOp::Delete { id: 1 },
            MutationOp::ShiftOrder {
                parent_id: None,
                from_order: 1,
                delta: -1,
            },
        ]);
        assert!(matches!(
            result,
            Err(StoreError::DanglingParent { id: 3, parent_id: 1 })
        ));
    }

    #[test]
    fn test_reparent_into_own_subtree_is_a_cycle() {
        let mut store = store();
        let result = store.transaction(&[
            MutationOp::SetParent {
                id: 1,
                parent_id: Some(3),
            },
            MutationOp::SetOrder { id: 1, order: 0 },
            MutationOp::ShiftOrder {
                parent_id: None,
                from_order: 1,
                delta: -1,
            },
        ]);
        assert!(matches!(result, Err(StoreError::Cycle(_))));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let mut store = store();
        let result = store.transaction(&[MutationOp::SetChecked {
            id: 42,
            checked: true,
        }]);
        assert!(matches!(result, Err(StoreError::NotFound(42))));
    }

    #[test]
    fn test_empty_transaction_does_not_bump_revision() {
        let mut store = store();
        store.transaction(&[]).unwrap();
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_mutation_ops_serialize_tagged() {
        let op = MutationOp::SetOrder { id: 3, order: 1 };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"op":"set_order","id":3,"order":1}"#);
    }
}
