//! Remote action log reader.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;

use inventora_core::actions::Action;
use inventora_core::sync::{decode_log_blob, parse_log_blob_name, LOG_BLOB_PREFIX};

use crate::error::Result;
use crate::store::{BlobRef, BlobStore};

/// Actions collected from a set of log blobs.
#[derive(Debug, Clone, Default)]
pub struct RemoteActions {
    pub actions: Vec<Action>,
    /// Embedded times of the blobs the actions came from, ascending.
    pub times: Vec<DateTime<Utc>>,
}

impl RemoteActions {
    pub fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.times.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Reads the action-log folder.
pub struct RemoteLogReader<'a> {
    store: &'a dyn BlobStore,
    folder_id: &'a str,
}

impl<'a> RemoteLogReader<'a> {
    pub fn new(store: &'a dyn BlobStore, folder_id: &'a str) -> Self {
        Self { store, folder_id }
    }

    /// Log blobs with a well-formed name, oldest first.
    async fn log_blobs(&self) -> Result<Vec<(BlobRef, DateTime<Utc>)>> {
        let mut blobs: Vec<(BlobRef, DateTime<Utc>)> = self
            .store
            .list(self.folder_id, LOG_BLOB_PREFIX)
            .await?
            .into_iter()
            .filter_map(|blob| match parse_log_blob_name(&blob.name) {
                Some(time) => Some((blob, time)),
                None => {
                    log::warn!(
                        "[InventorySync] Skipping log blob with malformed name {}",
                        blob.name
                    );
                    None
                }
            })
            .collect();
        blobs.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.name.cmp(&b.0.name)));
        Ok(blobs)
    }

    /// Latest embedded time across all log blobs.
    pub async fn latest_remote_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.log_blobs().await?.last().map(|(_, time)| *time))
    }

    /// Actions of every blob newer than `watermark` and at least `min_age` old.
    ///
    /// A download failure fails the whole read. A blob whose content does not
    /// decode is skipped but its time still counts as consumed.
    pub async fn actions_after(
        &self,
        watermark: DateTime<Utc>,
        min_age: Duration,
    ) -> Result<RemoteActions> {
        let now = Utc::now();
        let Ok(min_age) = chrono::Duration::from_std(min_age) else {
            return Ok(RemoteActions::default());
        };
        let eligible: Vec<(BlobRef, DateTime<Utc>)> = self
            .log_blobs()
            .await?
            .into_iter()
            .filter(|(_, time)| *time > watermark && now.signed_duration_since(*time) >= min_age)
            .collect();

        if eligible.is_empty() {
            return Ok(RemoteActions::default());
        }

        let contents =
            try_join_all(eligible.iter().map(|(blob, _)| self.store.read_text(&blob.id))).await?;

        let mut remote = RemoteActions::default();
        for ((blob, time), text) in eligible.into_iter().zip(contents) {
            match decode_log_blob(&text) {
                Ok(decoded) => {
                    if decoded.rejected > 0 {
                        log::warn!(
                            "[InventorySync] Skipped {} undecodable actions in {}",
                            decoded.rejected,
                            blob.name
                        );
                    }
                    remote.actions.extend(decoded.actions);
                }
                Err(err) => {
                    log::warn!(
                        "[InventorySync] Skipping unreadable log blob {}: {}",
                        blob.name,
                        err
                    );
                }
            }
            remote.times.push(time);
        }

        log::debug!(
            "[InventorySync] Read {} actions from {} log blobs after {}",
            remote.actions.len(),
            remote.times.len(),
            watermark
        );
        Ok(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;
    use inventora_core::actions::{ActionKind, Target};
    use inventora_core::sync::{log_blob_name, ActionLogBlob};
    use inventora_core::time::now_millis;

    async fn publish(store: &MemoryBlobStore, time: DateTime<Utc>, ids: &[&str]) {
        let blob = ActionLogBlob {
            time,
            actions: ids
                .iter()
                .map(|id| {
                    Action::from_parts(
                        *id,
                        ActionKind::DeleteItem(Target { id: "i-1".to_string() }),
                        time - chrono::Duration::milliseconds(10),
                        "x",
                    )
                })
                .collect(),
        };
        let text = serde_json::to_string(&blob).expect("encode blob");
        store.insert("log", &log_blob_name(&time), &text).await;
    }

    #[tokio::test]
    async fn latest_time_ignores_malformed_names() {
        let store = MemoryBlobStore::new();
        let t1 = now_millis() - chrono::Duration::minutes(3);
        let t2 = now_millis() - chrono::Duration::minutes(1);
        publish(&store, t1, &["a-1"]).await;
        publish(&store, t2, &["a-2"]).await;
        store
            .insert("log", "actions_2099-01-01T00:00:00.000Z.json", "{}")
            .await;

        let reader = RemoteLogReader::new(&store, "log");
        assert_eq!(reader.latest_remote_time().await.expect("latest"), Some(t2));

        let empty = MemoryBlobStore::new();
        let reader = RemoteLogReader::new(&empty, "log");
        assert_eq!(reader.latest_remote_time().await.expect("latest"), None);
    }

    #[tokio::test]
    async fn actions_after_filters_by_watermark_and_age() {
        let store = MemoryBlobStore::new();
        let old = now_millis() - chrono::Duration::minutes(10);
        let mid = now_millis() - chrono::Duration::minutes(6);
        let fresh = now_millis() - chrono::Duration::seconds(5);
        publish(&store, old, &["a-1"]).await;
        publish(&store, mid, &["a-2", "a-3"]).await;
        publish(&store, fresh, &["a-4"]).await;

        let reader = RemoteLogReader::new(&store, "log");
        let all = reader
            .actions_after(old, Duration::ZERO)
            .await
            .expect("read");
        assert_eq!(all.times, vec![mid, fresh]);
        assert_eq!(all.actions.len(), 3);

        let settled = reader
            .actions_after(old - chrono::Duration::seconds(1), Duration::from_secs(300))
            .await
            .expect("read");
        assert_eq!(settled.times, vec![old, mid]);
        assert_eq!(settled.latest_time(), Some(mid));
    }

    #[tokio::test]
    async fn undecodable_blob_is_skipped_but_consumed() {
        let store = MemoryBlobStore::new();
        let t1 = now_millis() - chrono::Duration::minutes(2);
        let t2 = now_millis() - chrono::Duration::minutes(1);
        store.insert("log", &log_blob_name(&t1), "not json").await;
        publish(&store, t2, &["a-2"]).await;

        let reader = RemoteLogReader::new(&store, "log");
        let remote = reader
            .actions_after(t1 - chrono::Duration::seconds(1), Duration::ZERO)
            .await
            .expect("read");
        assert_eq!(remote.actions.len(), 1);
        assert_eq!(remote.times, vec![t1, t2]);
    }

    #[tokio::test]
    async fn download_failure_aborts_the_read() {
        let store = MemoryBlobStore::new();
        publish(&store, now_millis() - chrono::Duration::minutes(1), &["a-1"]).await;
        store.set_fail_reads(true);

        let reader = RemoteLogReader::new(&store, "log");
        assert!(reader
            .actions_after(inventora_core::time::epoch(), Duration::ZERO)
            .await
            .is_err());
    }
}
