//! Sync engine over a [`BlobStore`].
//!
//! Folder layout:
//!
//! ```text
//! InventoraApp/
//!   inventory.json      mutable snapshot {version, time, items}
//!   storage.json        mutable snapshot {version, time, units}
//!   actions/
//!     actions_<time>.json   immutable log blobs {time, actions}
//! ```
//!
//! The engine never holds the session lock across I/O.

mod log_reader;
mod merge;
mod scheduler;

pub use log_reader::{RemoteActions, RemoteLogReader};
pub use scheduler::SyncScheduler;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};

use inventora_core::actions::ANONYMOUS_ACTOR;
use inventora_core::inventory::{InventorySnapshot, LenientSnapshot, StorageSnapshot};
use inventora_core::sync::{
    log_blob_name, ActionLogBlob, ClientSession, CompactionOutcome, INVENTORY_FILENAME,
    STORAGE_FILENAME,
};
use inventora_core::time::now_millis;

use crate::auth::AuthSession;
use crate::client::{DriveClient, SESSION_EXPIRED_MESSAGE};
use crate::config::SyncConfig;
use crate::error::{DriveSyncError, Result};
use crate::store::{BlobRef, BlobStore};

/// Ids of the shared folders, resolved once per engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folders {
    pub root: String,
    pub actions: String,
}

pub struct SyncEngine {
    store: Arc<dyn BlobStore>,
    session: Arc<Mutex<ClientSession>>,
    config: SyncConfig,
    folders: OnceCell<Folders>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn BlobStore>,
        session: Arc<Mutex<ClientSession>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            session,
            config,
            folders: OnceCell::new(),
        }
    }

    /// Engine backed by Drive, with the signed-in user as actor.
    ///
    /// Falls back to the anonymous actor when the identity lookup fails for
    /// any reason other than a rejected session.
    pub async fn connect_drive(config: SyncConfig, auth: Arc<dyn AuthSession>) -> Result<Self> {
        let client = DriveClient::new(&config, auth)?;
        let actor_id = match client.fetch_user_identity().await {
            Ok(info) => info.actor_id().to_string(),
            Err(err) if err.is_auth() => return Err(err),
            Err(err) => {
                log::warn!("[InventorySync] Could not resolve user identity: {}", err);
                ANONYMOUS_ACTOR.to_string()
            }
        };
        log::info!("[InventorySync] Connected to Drive as {}", actor_id);

        let session = Arc::new(Mutex::new(ClientSession::new(actor_id)));
        Ok(Self::new(Arc::new(client), session, config))
    }

    /// Shared handle to the client session; hosts dispatch handlers through it.
    pub fn session(&self) -> Arc<Mutex<ClientSession>> {
        Arc::clone(&self.session)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn store(&self) -> &dyn BlobStore {
        self.store.as_ref()
    }

    /// Root and actions folder ids, found or created on first use.
    pub async fn folders(&self) -> Result<&Folders> {
        self.folders
            .get_or_try_init(|| async {
                let root = self
                    .store
                    .ensure_folder(&self.config.root_folder_name, None)
                    .await?;
                let actions = self
                    .store
                    .ensure_folder(&self.config.actions_folder_name, Some(&root))
                    .await?;
                log::debug!(
                    "[InventorySync] Using folders root={} actions={}",
                    root,
                    actions
                );
                Ok::<_, DriveSyncError>(Folders { root, actions })
            })
            .await
    }

    /// Records a failed operation on the session status.
    async fn note_error(&self, operation: &str, err: &DriveSyncError) {
        log::warn!("[InventorySync] {} failed: {}", operation, err);
        let mut session = self.session.lock().await;
        session.record_error(format!("{} failed: {}", operation, err));
        if err.is_auth() {
            session.set_status_message(SESSION_EXPIRED_MESSAGE);
        }
    }

    /// Reads a master snapshot, creating it with `default` when absent.
    ///
    /// Entities that do not decode are left out. A master that is not a
    /// snapshot object at all is replaced by `default` locally and left
    /// untouched remotely.
    async fn load_master<T>(&self, folder_id: &str, name: &str, default: T) -> Result<T>
    where
        T: Serialize + LenientSnapshot + Send,
    {
        match self.store().find(folder_id, name).await? {
            None => {
                let content = serde_json::to_string(&default)?;
                self.store().create(folder_id, name, &content).await?;
                log::info!("[InventorySync] Created {}", name);
                Ok(default)
            }
            Some(blob) => {
                let text = self.store().read_text(&blob.id).await?;
                match T::decode_lenient(&text) {
                    Ok(decoded) => {
                        if !decoded.is_clean() {
                            log::warn!(
                                "[InventorySync] Loaded {} without {} entities and {} meta entries",
                                name,
                                decoded.rejected_entities,
                                decoded.rejected_meta
                            );
                        }
                        Ok(decoded.snapshot)
                    }
                    Err(err) => {
                        log::warn!("[InventorySync] Ignoring unreadable {}: {}", name, err);
                        Ok(default)
                    }
                }
            }
        }
    }

    async fn load_masters_inner(&self) -> Result<()> {
        let root = self.folders().await?.root.clone();
        let now = now_millis();
        let inventory = self
            .load_master(&root, INVENTORY_FILENAME, InventorySnapshot::initial(now))
            .await?;
        let storage = self
            .load_master(&root, STORAGE_FILENAME, StorageSnapshot::initial(now))
            .await?;

        log::info!(
            "[InventorySync] Loaded {} items and {} storage units",
            inventory.items.len(),
            storage.units.len()
        );
        self.session.lock().await.load_masters(inventory, storage);
        Ok(())
    }

    /// Loads both master snapshots into the session. Ticks are no-ops until
    /// this has succeeded once.
    pub async fn load_masters(&self) -> Result<()> {
        let result = self.load_masters_inner().await;
        if let Err(err) = &result {
            self.note_error("Loading masters", err).await;
        }
        result
    }

    /// Publishes the pending queue as one new log blob.
    ///
    /// Returns the blob name, or `None` when nothing was pending. On failure
    /// the queue is left intact.
    pub async fn push_local_pending(&self) -> Result<Option<String>> {
        let Some(actions) = self.session.lock().await.snapshot_for_push() else {
            return Ok(None);
        };

        let time = now_millis();
        let filename = log_blob_name(&time);
        let blob = ActionLogBlob { time, actions };
        let result: Result<BlobRef> = async {
            let content = serde_json::to_string(&blob)?;
            let folder = self.folders().await?.actions.clone();
            self.store().create(&folder, &filename, &content).await
        }
        .await;

        match result {
            Ok(_) => {
                self.session
                    .lock()
                    .await
                    .mark_published(time, &blob.actions, &filename);
                Ok(Some(filename))
            }
            Err(err) => {
                self.note_error("Push", &err).await;
                Err(err)
            }
        }
    }

    /// Drops all unpublished work and reloads the masters.
    pub async fn discard_and_reload(&self) -> Result<()> {
        self.session.lock().await.discard_unpublished();
        self.load_masters().await?;
        self.session.lock().await.record_reload();
        Ok(())
    }

    /// Compacts every log blob newer than the shared watermark, regardless of age.
    pub async fn merge_remote_now(&self) -> Result<CompactionOutcome> {
        let result = self.compact_remote(std::time::Duration::ZERO).await;
        if let Err(err) = &result {
            self.note_error("Merge to Drive", err).await;
        }
        result
    }

    /// Overwrites `existing` or creates `name` in `folder_id`.
    async fn write_master(
        &self,
        folder_id: &str,
        existing: Option<&BlobRef>,
        name: &str,
        content: &str,
    ) -> Result<()> {
        match existing {
            Some(blob) => self.store().overwrite(&blob.id, content).await,
            None => self.store().create(folder_id, name, content).await.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests;
