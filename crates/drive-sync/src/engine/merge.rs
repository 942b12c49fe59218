//! Local catch-up merge and remote compaction merge.

use std::time::Duration;

use inventora_core::actions::apply_actions;
use inventora_core::inventory::{
    InventorySnapshot, LenientSnapshot, StorageSnapshot, SNAPSHOT_SCHEMA_VERSION,
};
use inventora_core::sync::{
    CompactionOutcome, LocalSyncOutcome, INVENTORY_FILENAME, STORAGE_FILENAME,
};
use inventora_core::time::epoch;

use super::log_reader::RemoteLogReader;
use super::SyncEngine;
use crate::error::Result;
use crate::store::BlobRef;

impl SyncEngine {
    /// Compares the shared log with the local watermark and either folds the
    /// newer history into the session or flags an available update.
    pub async fn sync_local(&self) -> Result<LocalSyncOutcome> {
        let (loaded, watermark, pending) = {
            let session = self.session.lock().await;
            (
                session.masters_loaded(),
                session.watermark(),
                session.pending_len(),
            )
        };
        let (true, Some(watermark)) = (loaded, watermark) else {
            return Ok(LocalSyncOutcome::NotReady);
        };

        let folders = self.folders().await?;
        let reader = RemoteLogReader::new(self.store(), &folders.actions);
        let latest = reader.latest_remote_time().await?;

        if !latest.is_some_and(|latest| latest > watermark) {
            self.session.lock().await.set_update_available(false);
            return Ok(LocalSyncOutcome::UpToDate);
        }

        if pending > 0 {
            log::debug!(
                "[InventorySync] Remote is ahead with {} local actions pending",
                pending
            );
            self.session.lock().await.set_update_available(true);
            return Ok(LocalSyncOutcome::UpdateAvailable);
        }

        let remote = reader.actions_after(watermark, Duration::ZERO).await?;

        let mut session = self.session.lock().await;
        match session.apply_local_catch_up(Some(watermark), &remote.actions, &remote.times) {
            Some(actions) => {
                session.set_update_available(false);
                Ok(LocalSyncOutcome::Merged { actions })
            }
            None if session.has_unpublished_work() => {
                session.set_update_available(true);
                Ok(LocalSyncOutcome::UpdateAvailable)
            }
            None => Ok(LocalSyncOutcome::Stale),
        }
    }

    /// Folds every log blob newer than the shared watermark and at least
    /// `min_age` old into the shared snapshots, then mirrors the result into
    /// the session.
    ///
    /// Always bases itself on the snapshots currently stored remotely.
    pub async fn compact_remote(&self, min_age: Duration) -> Result<CompactionOutcome> {
        if !self.session.lock().await.masters_loaded() {
            return Ok(CompactionOutcome::NotReady);
        }

        let folders = self.folders().await?;
        let (inventory_blob, remote_inventory) = self
            .read_remote_master::<InventorySnapshot>(&folders.root, INVENTORY_FILENAME)
            .await?;
        let watermark = remote_inventory.time.unwrap_or_else(epoch);

        let reader = RemoteLogReader::new(self.store(), &folders.actions);
        let remote = reader.actions_after(watermark, min_age).await?;
        let Some(merge_time) = remote.latest_time() else {
            log::debug!("[InventorySync] Nothing to compact after {}", watermark);
            return Ok(CompactionOutcome::NothingToFold);
        };

        let (storage_blob, remote_storage) = self
            .read_remote_master::<StorageSnapshot>(&folders.root, STORAGE_FILENAME)
            .await?;

        let replayed = apply_actions(&remote.actions, &remote_inventory, &remote_storage);
        let inventory = InventorySnapshot {
            version: schema_version(replayed.inventory.version),
            time: Some(merge_time),
            items: replayed.inventory.items,
        };
        let storage = StorageSnapshot {
            version: schema_version(replayed.storage.version),
            time: Some(merge_time),
            units: replayed.storage.units,
        };

        self.write_master(
            &folders.root,
            inventory_blob.as_ref(),
            INVENTORY_FILENAME,
            &serde_json::to_string(&inventory)?,
        )
        .await?;
        self.write_master(
            &folders.root,
            storage_blob.as_ref(),
            STORAGE_FILENAME,
            &serde_json::to_string(&storage)?,
        )
        .await?;

        let folded = remote.actions.len();
        let blobs = remote.times.len();
        self.session
            .lock()
            .await
            .adopt_compaction(inventory, storage, folded);

        Ok(CompactionOutcome::Compacted {
            actions: folded,
            blobs,
        })
    }

    /// Reads a master snapshot for compaction. A missing blob reads as an
    /// empty snapshot and one that is not a snapshot object aborts.
    ///
    /// Entities that do not decode are dropped, so the rewritten master no
    /// longer carries them.
    async fn read_remote_master<T>(
        &self,
        folder_id: &str,
        name: &str,
    ) -> Result<(Option<BlobRef>, T)>
    where
        T: LenientSnapshot + Default,
    {
        match self.store().find(folder_id, name).await? {
            Some(blob) => {
                let text = self.store().read_text(&blob.id).await?;
                let decoded = T::decode_lenient(&text)?;
                if !decoded.is_clean() {
                    log::warn!(
                        "[InventorySync] Compacting {} without {} entities and {} meta entries",
                        name,
                        decoded.rejected_entities,
                        decoded.rejected_meta
                    );
                }
                Ok((Some(blob), decoded.snapshot))
            }
            None => Ok((None, T::default())),
        }
    }
}

fn schema_version(version: i64) -> i64 {
    if version > 0 {
        version
    } else {
        SNAPSHOT_SCHEMA_VERSION
    }
}
