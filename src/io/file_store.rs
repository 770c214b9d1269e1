use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::lock::{self, DEFAULT_TIMEOUT};
use crate::io::recovery::atomic_write;
use crate::io::store::{ItemTable, MutationOp, OrderStore, StoreError};
use crate::model::item::{Item, ItemId};

pub const ITEMS_FILE: &str = "items.json";

/// On-disk shape of `items.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemsFile {
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// Store backed by `items.json` in a project directory.
///
/// Reads come from the snapshot taken at open (or the last refresh). Ops are
/// planned against that snapshot, so a transaction only commits when the file
/// still holds the revision the snapshot was read at. Otherwise the snapshot is
/// replaced with what is on disk and `StaleRevision` asks the caller to replan.
#[derive(Debug)]
pub struct FileStore {
    project_dir: PathBuf,
    table: ItemTable,
    revision: u64,
}

impl FileStore {
    pub fn open(project_dir: &Path) -> Result<Self, StoreError> {
        let (table, revision) = load(project_dir)?;
        Ok(FileStore {
            project_dir: project_dir.to_path_buf(),
            table,
            revision,
        })
    }

    pub fn table(&self) -> &ItemTable {
        &self.table
    }
}

pub fn items_path(project_dir: &Path) -> PathBuf {
    project_dir.join(ITEMS_FILE)
}

/// Read `items.json`; a missing file is an empty list at revision 0.
pub fn load(project_dir: &Path) -> Result<(ItemTable, u64), StoreError> {
    let path = items_path(project_dir);
    let file = match std::fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str::<ItemsFile>(&text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ItemsFile::default(),
        Err(e) => return Err(e.into()),
    };
    Ok((ItemTable::from_items(file.items), file.revision))
}

/// Write `items.json` atomically, items sorted by parent then order.
pub fn save(project_dir: &Path, table: &ItemTable, revision: u64) -> Result<(), StoreError> {
    let mut items = table.items();
    items.sort_by_key(|i| (i.parent_id, i.order, i.id));
    let file = ItemsFile { revision, items };
    let mut json = serde_json::to_string_pretty(&file)?;
    json.push('\n');
    atomic_write(&items_path(project_dir), json.as_bytes())?;
    Ok(())
}

impl OrderStore for FileStore {
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
        let dir = self.project_dir.clone();
        let (table, revision) = lock::with_lock(&dir, DEFAULT_TIMEOUT, || {
            let (fresh, found) = load(&dir)?;
            if found != self.revision {
                let expected = self.revision;
                self.table = fresh;
                self.revision = found;
                return Err(StoreError::StaleRevision { expected, found });
            }
            let next = fresh.apply_all(ops)?;
            save(&dir, &next, found + 1)?;
            Ok((next, found + 1))
        })?;
        self.table = table;
        self.revision = revision;
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), StoreError> {
        let (table, revision) = load(&self.project_dir)?;
        self.table = table;
        self.revision = revision;
        Ok(())
    }
}
