//! Client-side sync session.
//!
//! The session owns two states:
//!
//! - `confirmed`: exactly the shared history up to the local watermark.
//! - `view`: `confirmed` plus published-but-unobserved batches plus the pending
//!   queue. Handlers validate against and apply to the view.
//!
//! Merges only ever fold remote history into `confirmed` and then rebuild the
//! view, so local actions are never applied twice.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::pending_queue::PendingQueue;
use super::scheduler::MERGE_LOG_CAPACITY;
use super::state::{InventoraState, StateAction};
use crate::actions::{
    apply_actions, new_item_id, new_storage_id, validate, Action, ActionKind, AddCount,
    CreateItem, CreateStorage, MoveItem, RemoveMeta, Rename, SetMeta, SetQuantity, Target,
    ValidationErrors, ANONYMOUS_ACTOR,
};
use crate::inventory::{
    InventorySnapshot, ItemMetaKey, MetaMap, MetaValue, StorageMetaKey, StorageSnapshot,
};
use crate::time::now_millis;

/// Whether a handler call should change state or only report problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    Commit,
    ValidateOnly,
}

/// One user-visible merge log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Host-facing summary of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub pending_count: usize,
    pub update_available: bool,
    pub masters_loaded: bool,
    pub last_push_at: Option<DateTime<Utc>>,
    pub last_local_merge_at: Option<DateTime<Utc>>,
    pub last_compaction_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub status_message: Option<String>,
}

/// Actions published in one log blob that the watermark has not passed yet.
#[derive(Debug, Clone)]
struct PublishedBatch {
    time: DateTime<Utc>,
    actions: Vec<Action>,
}

#[derive(Debug)]
pub struct ClientSession {
    actor_id: String,
    confirmed: InventoraState,
    view: InventoraState,
    pending: PendingQueue,
    published: Vec<PublishedBatch>,
    update_available: bool,
    masters_loaded: bool,
    merge_log: VecDeque<MergeLogEntry>,
    last_push_at: Option<DateTime<Utc>>,
    last_local_merge_at: Option<DateTime<Utc>>,
    last_compaction_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    status_message: Option<String>,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(ANONYMOUS_ACTOR)
    }
}

impl ClientSession {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            confirmed: InventoraState::default(),
            view: InventoraState::default(),
            pending: PendingQueue::new(),
            published: Vec::new(),
            update_available: false,
            masters_loaded: false,
            merge_log: VecDeque::new(),
            last_push_at: None,
            last_local_merge_at: None,
            last_compaction_at: None,
            last_error: None,
            status_message: None,
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn set_actor_id(&mut self, actor_id: impl Into<String>) {
        self.actor_id = actor_id.into();
    }

    /// Current local view, including unpublished work.
    pub fn state(&self) -> &InventoraState {
        &self.view
    }

    pub fn inventory(&self) -> &InventorySnapshot {
        &self.view.inventory
    }

    pub fn storage(&self) -> &StorageSnapshot {
        &self.view.storage
    }

    /// Local watermark: the point in shared history the confirmed state covers.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.confirmed.watermark()
    }

    pub fn masters_loaded(&self) -> bool {
        self.masters_loaded
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True while there are local actions that exist nowhere else.
    pub fn has_unpublished_work(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn update_available(&self) -> bool {
        self.update_available
    }

    pub fn set_update_available(&mut self, available: bool) {
        if self.update_available != available {
            log::debug!("[InventorySync] Update available: {}", available);
        }
        self.update_available = available;
    }

    /// Newest first.
    pub fn merge_log(&self) -> impl Iterator<Item = &MergeLogEntry> {
        self.merge_log.iter()
    }

    pub fn status(&self) -> SyncEngineStatus {
        SyncEngineStatus {
            pending_count: self.pending.len(),
            update_available: self.update_available,
            masters_loaded: self.masters_loaded,
            last_push_at: self.last_push_at,
            last_local_merge_at: self.last_local_merge_at,
            last_compaction_at: self.last_compaction_at,
            last_error: self.last_error.clone(),
            status_message: self.status_message.clone(),
        }
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    fn log_merge(&mut self, message: String) {
        log::info!("[InventorySync] {}", message);
        self.merge_log.push_front(MergeLogEntry {
            at: now_millis(),
            message,
        });
        self.merge_log.truncate(MERGE_LOG_CAPACITY);
    }

    // Masters

    /// Adopts freshly read master snapshots as the confirmed state.
    ///
    /// Pending and still-unobserved published actions are replayed on top.
    pub fn load_masters(&mut self, inventory: InventorySnapshot, storage: StorageSnapshot) {
        self.confirmed = InventoraState::new(inventory, storage);
        self.masters_loaded = true;
        self.forget_confirmed_batches();
        self.rebuild_view();
    }

    /// Drops pending and published-but-unobserved actions, reverting the view
    /// to the confirmed state.
    pub fn discard_unpublished(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();
        self.published.clear();
        self.update_available = false;
        self.rebuild_view();
        log::info!("[InventorySync] Discarded {} unpublished actions", dropped);
    }

    pub fn record_reload(&mut self) {
        self.set_status_message("Reloaded inventory and storage from Drive");
        self.log_merge("Reloaded inventory and storage from Drive".to_string());
    }

    // Push

    /// Copy of the pending queue to publish, or `None` when it is empty.
    pub fn snapshot_for_push(&self) -> Option<Vec<Action>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.actions().to_vec())
        }
    }

    /// Records that `published` was written as the log blob `filename` created
    /// at `time`.
    ///
    /// Only actions still queued move to the published batches. Anything a
    /// discard dropped meanwhile stays dropped, and anything queued after the
    /// push copy was taken stays pending.
    pub fn mark_published(&mut self, time: DateTime<Utc>, published: &[Action], filename: &str) {
        let actions = self.pending.remove_published(published);
        if !actions.is_empty() {
            self.published.push(PublishedBatch { time, actions });
        }
        self.last_push_at = Some(time);
        self.set_status_message(format!("Pushed actions to {}", filename));
        self.log_merge(format!("Pushed actions to {}", filename));
    }

    // Merges

    /// Folds remote history newer than the watermark into the confirmed state.
    ///
    /// `expected_watermark` is the watermark the caller read before its I/O;
    /// the fold is dropped (`None`) when it moved, when local actions were
    /// queued meanwhile, or when masters are not loaded. `consumed_times` are
    /// the times of the log blobs the actions came from.
    pub fn apply_local_catch_up(
        &mut self,
        expected_watermark: Option<DateTime<Utc>>,
        actions: &[Action],
        consumed_times: &[DateTime<Utc>],
    ) -> Option<usize> {
        if !self.masters_loaded
            || self.confirmed.watermark() != expected_watermark
            || !self.pending.is_empty()
        {
            log::debug!("[InventorySync] Dropping stale local merge");
            return None;
        }
        let Some(merge_time) = consumed_times.iter().copied().max() else {
            return Some(0);
        };
        if Some(merge_time) <= expected_watermark {
            return Some(0);
        }

        let replayed = apply_actions(actions, &self.confirmed.inventory, &self.confirmed.storage);
        self.confirmed =
            InventoraState::new(replayed.inventory, replayed.storage).with_time(merge_time);
        self.forget_confirmed_batches();
        self.rebuild_view();
        self.last_local_merge_at = Some(now_millis());
        self.log_merge(format!(
            "Merged {} remote actions into local state",
            actions.len()
        ));
        Some(actions.len())
    }

    /// Records a compaction written to the shared snapshots and mirrors it
    /// locally unless it is older than the local watermark.
    ///
    /// Returns whether the local confirmed state was replaced.
    pub fn adopt_compaction(
        &mut self,
        inventory: InventorySnapshot,
        storage: StorageSnapshot,
        folded: usize,
    ) -> bool {
        self.last_compaction_at = Some(now_millis());
        self.log_merge(format!("Merged {} remote actions into Drive", folded));

        let incoming = InventoraState::new(inventory, storage);
        let adopt = match (incoming.watermark(), self.confirmed.watermark()) {
            (None, _) => false,
            (Some(_), None) => self.masters_loaded,
            (Some(incoming), Some(local)) => incoming >= local,
        };
        if !adopt {
            log::debug!("[InventorySync] Local state is ahead of compaction, not mirroring");
            return false;
        }

        self.confirmed = incoming;
        self.forget_confirmed_batches();
        self.rebuild_view();
        true
    }

    /// Published batches at or before the watermark are part of the confirmed
    /// state now.
    fn forget_confirmed_batches(&mut self) {
        if let Some(watermark) = self.confirmed.watermark() {
            self.published.retain(|batch| batch.time > watermark);
        }
    }

    fn rebuild_view(&mut self) {
        let local: Vec<Action> = self
            .published
            .iter()
            .flat_map(|batch| batch.actions.iter().cloned())
            .chain(self.pending.actions().iter().cloned())
            .collect();
        if local.is_empty() {
            self.view = self.confirmed.clone();
            return;
        }

        let replayed = apply_actions(&local, &self.confirmed.inventory, &self.confirmed.storage);
        self.view = InventoraState::new(
            InventorySnapshot {
                time: self.confirmed.inventory.time,
                ..replayed.inventory
            },
            StorageSnapshot {
                time: self.confirmed.storage.time,
                ..replayed.storage
            },
        );
    }

    // Handlers

    /// Builds an action, validates it against the view and, in commit mode,
    /// applies it optimistically and queues it.
    pub fn dispatch(
        &mut self,
        kind: ActionKind,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let action = Action::new(kind, self.actor_id.clone());
        validate(&action, &self.view.inventory, &self.view.storage)?;
        if mode == DispatchMode::ValidateOnly {
            return Ok(action);
        }

        self.view = std::mem::take(&mut self.view).reduce(StateAction::ApplyAction(action.clone()));
        self.pending.enqueue(action.clone());
        self.log_merge(format!(
            "Enqueued {} {}",
            action.action_type().as_str(),
            action.kind.target_id()
        ));
        Ok(action)
    }

    pub fn create_item(
        &mut self,
        name: &str,
        initial_qty: i64,
        storage_unit_id: Option<String>,
        meta: MetaMap<ItemMetaKey>,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::CreateItem(CreateItem {
            id: new_item_id(),
            name: name.trim().to_string(),
            initial_qty,
            storage_unit_id,
            meta,
        });
        self.dispatch(kind, mode)
    }

    pub fn delete_item(
        &mut self,
        id: impl Into<String>,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        self.dispatch(ActionKind::DeleteItem(Target { id: id.into() }), mode)
    }

    pub fn rename_item(
        &mut self,
        id: impl Into<String>,
        name: &str,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::RenameItem(Rename {
            id: id.into(),
            name: name.trim().to_string(),
        });
        self.dispatch(kind, mode)
    }

    pub fn set_quantity(
        &mut self,
        id: impl Into<String>,
        qty: i64,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        self.dispatch(ActionKind::SetQuantity(SetQuantity { id: id.into(), qty }), mode)
    }

    pub fn add_count(
        &mut self,
        id: impl Into<String>,
        amount: i64,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        self.dispatch(ActionKind::AddCount(AddCount { id: id.into(), amount }), mode)
    }

    pub fn move_item(
        &mut self,
        id: impl Into<String>,
        to_storage_id: impl Into<String>,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::MoveItem(MoveItem {
            id: id.into(),
            to_storage_id: to_storage_id.into(),
        });
        self.dispatch(kind, mode)
    }

    pub fn set_item_meta(
        &mut self,
        id: impl Into<String>,
        key: ItemMetaKey,
        value: MetaValue,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::SetItemMeta(SetMeta {
            id: id.into(),
            key,
            value,
        });
        self.dispatch(kind, mode)
    }

    pub fn remove_item_meta(
        &mut self,
        id: impl Into<String>,
        key: ItemMetaKey,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        self.dispatch(ActionKind::RemoveItemMeta(RemoveMeta { id: id.into(), key }), mode)
    }

    pub fn create_storage(
        &mut self,
        name: &str,
        meta: MetaMap<StorageMetaKey>,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::CreateStorage(CreateStorage {
            id: new_storage_id(),
            name: name.trim().to_string(),
            meta,
        });
        self.dispatch(kind, mode)
    }

    pub fn delete_storage(
        &mut self,
        id: impl Into<String>,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        self.dispatch(ActionKind::DeleteStorage(Target { id: id.into() }), mode)
    }

    pub fn rename_storage(
        &mut self,
        id: impl Into<String>,
        name: &str,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::RenameStorage(Rename {
            id: id.into(),
            name: name.trim().to_string(),
        });
        self.dispatch(kind, mode)
    }

    pub fn set_storage_meta(
        &mut self,
        id: impl Into<String>,
        key: StorageMetaKey,
        value: MetaValue,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::SetStorageMeta(SetMeta {
            id: id.into(),
            key,
            value,
        });
        self.dispatch(kind, mode)
    }

    pub fn remove_storage_meta(
        &mut self,
        id: impl Into<String>,
        key: StorageMetaKey,
        mode: DispatchMode,
    ) -> Result<Action, ValidationErrors> {
        let kind = ActionKind::RemoveStorageMeta(RemoveMeta { id: id.into(), key });
        self.dispatch(kind, mode)
    }
}
