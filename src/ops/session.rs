use std::path::PathBuf;
use std::sync::Arc;

use crate::io::recovery::{RecoveryCategory, RecoveryEntry, log_recovery};
use crate::io::store::{OrderStore, StoreError};
use crate::model::config::Config;
use crate::model::drag::{DragState, DragToken, LayoutRow};
use crate::model::item::ItemId;
use crate::model::tree::Forest;
use crate::model::visible::{VisibleItem, find_visible};
use crate::ops::assemble::assemble_sorted;
use crate::ops::drag::{DragCommit, DragEngine, DragError, DragStateReader, resolve_tier_change};
use crate::ops::flatten::flatten;
use crate::ops::order_ops::{self, MutationRequest, OrderError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("item {0} is not visible")]
    NotVisible(ItemId),
    #[error(transparent)]
    Drag(#[from] DragError),
    #[error(transparent)]
    Order(#[from] OrderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A list being viewed and edited: the store, its settings, and the drag
/// engine whose state the renderer subscribes to.
pub struct ListSession<S: OrderStore> {
    store: S,
    config: Config,
    engine: DragEngine,
    /// Where rejected changes are written, if anywhere
    recovery_dir: Option<PathBuf>,
}

impl<S: OrderStore> ListSession<S> {
    pub fn new(store: S, config: Config) -> Self {
        let engine = DragEngine::new(&config);
        ListSession {
            store,
            config,
            engine,
            recovery_dir: None,
        }
    }

    pub fn with_recovery_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recovery_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn drag_state(&self) -> Arc<DragState> {
        self.engine.state()
    }

    pub fn subscribe(&self) -> DragStateReader {
        self.engine.subscribe()
    }

    pub fn forest(&self) -> Result<Forest, StoreError> {
        Ok(assemble_sorted(self.store.items()?))
    }

    /// The rendered sequence. While a drag is active the dragged item's
    /// subtree is withheld.
    pub fn visible(&self) -> Result<Vec<VisibleItem>, StoreError> {
        let excluded = self.engine.state().dragged_id();
        Ok(flatten(&self.forest()?, excluded))
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Add an item under `parent_id`, or right after `after` when given.
    pub fn add(
        &mut self,
        text: &str,
        parent_id: Option<ItemId>,
        after: Option<ItemId>,
    ) -> Result<ItemId, SessionError> {
        if let Some(target) = after {
            let parent = self
                .store
                .get(target)?
                .ok_or(OrderError::NotFound(target))?
                .parent_id;
            order_ops::ensure_can_nest(&self.store, parent, self.config.list.max_tier)?;
            return Ok(order_ops::insert_after(&mut self.store, target, text)?);
        }
        order_ops::ensure_can_nest(&self.store, parent_id, self.config.list.max_tier)?;
        Ok(order_ops::insert_respecting_auto_sort(
            &mut self.store,
            parent_id,
            text,
            self.config.list.auto_sort,
        )?)
    }

    pub fn set_checked(&mut self, id: ItemId, checked: bool) -> Result<(), SessionError> {
        let auto_sort = self.config.list.auto_sort;
        if checked {
            order_ops::mark_complete(&mut self.store, id, auto_sort)?;
        } else {
            order_ops::mark_incomplete(&mut self.store, id, auto_sort)?;
        }
        Ok(())
    }

    pub fn remove(&mut self, id: ItemId) -> Result<(), SessionError> {
        Ok(order_ops::remove(&mut self.store, id)?)
    }

    /// Flip the expanded flag. Returns the new value.
    pub fn toggle_expanded(&mut self, id: ItemId) -> Result<bool, SessionError> {
        let item = self.store.get(id)?.ok_or(OrderError::NotFound(id))?;
        order_ops::set_expanded(&mut self.store, id, !item.expanded)?;
        Ok(!item.expanded)
    }

    pub fn set_text(&mut self, id: ItemId, text: &str) -> Result<(), SessionError> {
        Ok(order_ops::set_text(&mut self.store, id, text)?)
    }

    pub fn move_sibling(&mut self, id: ItemId, to: usize) -> Result<(), SessionError> {
        let auto_sort = self.config.list.auto_sort;
        Ok(order_ops::move_sibling(&mut self.store, id, to, auto_sort)?)
    }

    /// Shift an item `delta` tiers, resolving the new parent the way a
    /// horizontal drag does.
    pub fn change_tier(&mut self, id: ItemId, delta: i32) -> Result<(), SessionError> {
        if delta == 0 {
            return Ok(());
        }
        let forest = self.forest()?;
        if !forest.contains(id) {
            return Err(OrderError::NotFound(id).into());
        }
        let request = resolve_tier_change(&forest, id, delta).ok_or_else(|| {
            OrderError::InvalidTarget(format!("item {id} cannot move {delta} tier(s)"))
        })?;
        let base = self.store.revision();
        self.commit(&request, base)
    }

    // -----------------------------------------------------------------------
    // Drag
    // -----------------------------------------------------------------------

    pub fn begin_drag(
        &mut self,
        id: ItemId,
        row: LayoutRow,
        pointer_offset_y: f32,
    ) -> Result<DragToken, SessionError> {
        let forest = self.forest()?;
        let visible = flatten(&forest, None);
        let origin = find_visible(&visible, id).ok_or(SessionError::NotVisible(id))?;
        let revision = self.store.revision();
        Ok(self
            .engine
            .on_drag_start(origin, row, pointer_offset_y, &forest, revision)?)
    }

    pub fn drag(
        &mut self,
        token: DragToken,
        delta_x: f32,
        delta_y: f32,
        layout: &[LayoutRow],
    ) -> Result<Arc<DragState>, SessionError> {
        let visible = self.visible()?;
        Ok(self.engine.on_drag(token, delta_x, delta_y, &visible, layout)?)
    }

    /// Release the drag and commit whatever it resolved to. Returns the
    /// request that was applied, if any.
    pub fn end_drag(&mut self, token: DragToken) -> Result<Option<MutationRequest>, SessionError> {
        let visible = self.visible()?;
        let Some(DragCommit {
            base_revision,
            request,
            ..
        }) = self.engine.on_drag_end(token, &visible)
        else {
            return Ok(None);
        };
        self.commit(&request, base_revision)?;
        Ok(Some(request))
    }

    /// Resolve the drag without committing anything.
    pub fn preview_drag_end(&mut self, token: DragToken) -> Result<Option<MutationRequest>, SessionError> {
        let visible = self.visible()?;
        Ok(self.engine.on_drag_end(token, &visible).map(|c| c.request))
    }

    pub fn cancel_drag(&mut self, token: DragToken) {
        self.engine.on_drag_cancel(token);
    }

    fn commit(&mut self, request: &MutationRequest, base_revision: u64) -> Result<(), SessionError> {
        let result = order_ops::apply_request(&mut self.store, request, base_revision, &self.config.list);
        if let Err(e) = &result {
            self.note_rejected(request, base_revision, e);
        }
        Ok(result?)
    }

    fn note_rejected(&self, request: &MutationRequest, base_revision: u64, err: &OrderError) {
        let category = match err {
            OrderError::ConcurrentMutationConflict { .. } => RecoveryCategory::Conflict,
            OrderError::RetriesExhausted { .. } | OrderError::Store(_) => RecoveryCategory::Write,
            // Ordinary validation failures lose nothing worth keeping
            _ => return,
        };
        tracing::warn!(id = request.id(), error = %err, "change rejected");
        let Some(dir) = &self.recovery_dir else {
            return;
        };
        let body = serde_json::to_string(request).unwrap_or_default();
        let entry = RecoveryEntry::new(category, format!("change to item {} rejected", request.id()))
            .field("Item", request.id())
            .field("Base revision", base_revision)
            .field("Error", err)
            .body(body);
        log_recovery(dir, &entry);
    }
}
