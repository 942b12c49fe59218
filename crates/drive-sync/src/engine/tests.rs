use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use inventora_core::inventory::{
    InventorySnapshot, ItemMetaKey, MetaMap, MetaValue, StorageSnapshot, SNAPSHOT_SCHEMA_VERSION,
};
use inventora_core::sync::{
    decode_log_blob, parse_log_blob_name, ClientSession, CompactionOutcome, DispatchMode,
    LocalSyncOutcome, TickResult, TickTrigger, ACTIONS_FOLDER_NAME, DEFAULT_ROOT_FOLDER_NAME,
    INVENTORY_FILENAME, LOG_BLOB_PREFIX, STORAGE_FILENAME,
};
use inventora_core::time::{now_millis, to_iso};

use super::{SyncEngine, SyncScheduler};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::store::{BlobRef, BlobStore, MemoryBlobStore};

fn engine_over(store: Arc<dyn BlobStore>, actor: &str) -> SyncEngine {
    SyncEngine::new(
        store,
        Arc::new(Mutex::new(ClientSession::new(actor))),
        SyncConfig::default(),
    )
}

fn engine_on(store: &Arc<MemoryBlobStore>, actor: &str) -> SyncEngine {
    engine_over(Arc::clone(store) as Arc<dyn BlobStore>, actor)
}

/// Which store call [`GatedStore`] holds open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    LogBlobCreate,
    List,
}

/// Memory store that, once armed, parks the next gated call until released.
struct GatedStore {
    inner: Arc<MemoryBlobStore>,
    gate: Gate,
    armed: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl GatedStore {
    fn new(inner: Arc<MemoryBlobStore>, gate: Gate) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            released: Notify::new(),
        })
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Waits until a gated call is parked.
    async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    fn release(&self) {
        self.released.notify_one();
    }

    async fn hold(&self, gate: Gate) {
        if gate == self.gate && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
    }
}

#[async_trait]
impl BlobStore for GatedStore {
    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        self.inner.ensure_folder(name, parent).await
    }

    async fn find(&self, folder_id: &str, name: &str) -> Result<Option<BlobRef>> {
        self.inner.find(folder_id, name).await
    }

    async fn list(&self, folder_id: &str, prefix: &str) -> Result<Vec<BlobRef>> {
        self.hold(Gate::List).await;
        self.inner.list(folder_id, prefix).await
    }

    async fn read_text(&self, blob_id: &str) -> Result<String> {
        self.inner.read_text(blob_id).await
    }

    async fn create(&self, folder_id: &str, name: &str, content: &str) -> Result<BlobRef> {
        if name.starts_with(LOG_BLOB_PREFIX) {
            self.hold(Gate::LogBlobCreate).await;
        }
        self.inner.create(folder_id, name, content).await
    }

    async fn overwrite(&self, blob_id: &str, content: &str) -> Result<()> {
        self.inner.overwrite(blob_id, content).await
    }
}

async fn root_folder(store: &MemoryBlobStore) -> String {
    store
        .ensure_folder(DEFAULT_ROOT_FOLDER_NAME, None)
        .await
        .expect("root folder")
}

async fn actions_folder(store: &MemoryBlobStore) -> String {
    let root = root_folder(store).await;
    store
        .ensure_folder(ACTIONS_FOLDER_NAME, Some(&root))
        .await
        .expect("actions folder")
}

/// Writes masters stamped an hour ago so fresh pushes are always newer.
async fn seed_masters(store: &MemoryBlobStore) -> DateTime<Utc> {
    let time = now_millis() - chrono::Duration::hours(1);
    let root = root_folder(store).await;
    store
        .insert(
            &root,
            INVENTORY_FILENAME,
            &serde_json::to_string(&InventorySnapshot::initial(time)).expect("encode"),
        )
        .await;
    store
        .insert(
            &root,
            STORAGE_FILENAME,
            &serde_json::to_string(&StorageSnapshot::initial(time)).expect("encode"),
        )
        .await;
    time
}

async fn loaded_engine(store: &Arc<MemoryBlobStore>, actor: &str) -> SyncEngine {
    let engine = engine_on(store, actor);
    engine.load_masters().await.expect("load masters");
    engine
}

async fn add_storage(engine: &SyncEngine, name: &str) -> String {
    let action = engine
        .session()
        .lock()
        .await
        .create_storage(name, MetaMap::new(), DispatchMode::Commit)
        .expect("valid storage");
    action.kind.target_id().to_string()
}

async fn unit_names(engine: &SyncEngine) -> Vec<String> {
    let session = engine.session();
    let session = session.lock().await;
    let mut names: Vec<String> = session
        .storage()
        .units
        .iter()
        .map(|unit| unit.name.clone())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn load_masters_creates_missing_snapshots() {
    let store = Arc::new(MemoryBlobStore::new());
    let engine = loaded_engine(&store, "ana").await;

    assert_eq!(store.write_count().await, 2);
    let root = root_folder(&store).await;
    let inventory: InventorySnapshot = serde_json::from_str(
        &store
            .content(&root, INVENTORY_FILENAME)
            .await
            .expect("inventory blob"),
    )
    .expect("decode inventory");
    assert_eq!(inventory.version, SNAPSHOT_SCHEMA_VERSION);
    assert!(inventory.time.is_some());

    let session = engine.session();
    assert!(session.lock().await.masters_loaded());

    // A second client reads what the first one created.
    loaded_engine(&store, "bo").await;
    assert_eq!(store.write_count().await, 2);
}

#[tokio::test]
async fn unreadable_master_is_replaced_locally_only() {
    let store = Arc::new(MemoryBlobStore::new());
    let root = root_folder(&store).await;
    store.insert(&root, INVENTORY_FILENAME, "garbage").await;

    let engine = loaded_engine(&store, "ana").await;
    assert_eq!(store.write_count().await, 1);
    assert_eq!(
        store.content(&root, INVENTORY_FILENAME).await.as_deref(),
        Some("garbage")
    );
    assert!(engine.session().lock().await.inventory().items.is_empty());
}

#[tokio::test]
async fn push_publishes_pending_queue_as_one_blob() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let engine = loaded_engine(&store, "ana").await;
    add_storage(&engine, "Shelf").await;
    add_storage(&engine, "Drawer").await;

    let filename = engine
        .push_local_pending()
        .await
        .expect("push")
        .expect("blob written");
    assert!(parse_log_blob_name(&filename).is_some());

    let folder = actions_folder(&store).await;
    let text = store.content(&folder, &filename).await.expect("log blob");
    let blob = decode_log_blob(&text).expect("decode blob");
    assert_eq!(blob.actions.len(), 2);
    assert!(blob.actions.iter().all(|action| action.actor_id == "ana"));

    let session = engine.session();
    assert!(!session.lock().await.has_unpublished_work());
    assert_eq!(
        session.lock().await.merge_log().next().map(|e| e.message.clone()),
        Some(format!("Pushed actions to {}", filename))
    );

    assert_eq!(engine.push_local_pending().await.expect("push"), None);
    assert_eq!(store.blob_names(&folder).await.len(), 1);
}

#[tokio::test]
async fn failed_push_keeps_the_queue() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let engine = loaded_engine(&store, "ana").await;
    add_storage(&engine, "Shelf").await;

    store.set_fail_writes(true);
    assert!(engine.push_local_pending().await.is_err());

    let status = engine.session().lock().await.status();
    assert_eq!(status.pending_count, 1);
    assert!(status.last_error.is_some());

    store.set_fail_writes(false);
    assert!(engine.push_local_pending().await.expect("push").is_some());
    assert_eq!(engine.session().lock().await.pending_len(), 0);
}

#[tokio::test]
async fn remote_history_is_merged_when_nothing_is_pending() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let ana = loaded_engine(&store, "ana").await;
    let bo = loaded_engine(&store, "bo").await;

    add_storage(&bo, "Shelf").await;
    bo.push_local_pending().await.expect("push");

    assert_eq!(
        ana.sync_local().await.expect("sync"),
        LocalSyncOutcome::Merged { actions: 1 }
    );
    assert_eq!(unit_names(&ana).await, vec!["Shelf"]);
    assert_eq!(
        ana.sync_local().await.expect("sync"),
        LocalSyncOutcome::UpToDate
    );

    // Reading our own blob back does not apply it twice.
    assert_eq!(
        bo.sync_local().await.expect("sync"),
        LocalSyncOutcome::Merged { actions: 1 }
    );
    assert_eq!(unit_names(&bo).await, vec!["Shelf"]);
}

#[tokio::test]
async fn pending_work_turns_remote_changes_into_update_available() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let ana = loaded_engine(&store, "ana").await;
    let bo = loaded_engine(&store, "bo").await;

    add_storage(&ana, "Shelf").await;
    add_storage(&ana, "Drawer").await;
    add_storage(&bo, "Bin").await;
    bo.push_local_pending().await.expect("push");

    assert_eq!(
        ana.sync_local().await.expect("sync"),
        LocalSyncOutcome::UpdateAvailable
    );
    let session = ana.session();
    assert!(session.lock().await.update_available());
    assert_eq!(session.lock().await.pending_len(), 2);
    assert_eq!(unit_names(&ana).await, vec!["Drawer", "Shelf"]);

    ana.discard_and_reload().await.expect("reload");
    let status = session.lock().await.status();
    assert_eq!(status.pending_count, 0);
    assert!(!status.update_available);
    assert_eq!(
        status.status_message.as_deref(),
        Some("Reloaded inventory and storage from Drive")
    );
    assert!(unit_names(&ana).await.is_empty());

    assert_eq!(
        ana.sync_local().await.expect("sync"),
        LocalSyncOutcome::Merged { actions: 1 }
    );
    assert_eq!(unit_names(&ana).await, vec!["Bin"]);
}

#[tokio::test]
async fn compaction_runs_once_per_log_range() {
    let store = Arc::new(MemoryBlobStore::new());
    let seeded = seed_masters(&store).await;
    let ana = loaded_engine(&store, "ana").await;
    add_storage(&ana, "Shelf").await;
    let filename = ana
        .push_local_pending()
        .await
        .expect("push")
        .expect("blob written");
    let blob_time = parse_log_blob_name(&filename).expect("blob time");

    let writes_before = store.write_count().await;
    assert_eq!(
        ana.merge_remote_now().await.expect("compact"),
        CompactionOutcome::Compacted {
            actions: 1,
            blobs: 1
        }
    );
    assert_eq!(store.write_count().await, writes_before + 2);

    let root = root_folder(&store).await;
    let storage: StorageSnapshot = serde_json::from_str(
        &store
            .content(&root, STORAGE_FILENAME)
            .await
            .expect("storage blob"),
    )
    .expect("decode storage");
    assert_eq!(storage.units.len(), 1);
    assert_eq!(storage.time, Some(blob_time));
    assert!(storage.time > Some(seeded));

    let session = ana.session();
    let log_len = session.lock().await.merge_log().count();
    assert_eq!(session.lock().await.watermark(), Some(blob_time));

    assert_eq!(
        ana.merge_remote_now().await.expect("compact"),
        CompactionOutcome::NothingToFold
    );
    assert_eq!(store.write_count().await, writes_before + 2);
    assert_eq!(session.lock().await.merge_log().count(), log_len);
}

#[tokio::test]
async fn compaction_waits_for_the_inactivity_window() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let ana = loaded_engine(&store, "ana").await;
    add_storage(&ana, "Shelf").await;
    ana.push_local_pending().await.expect("push");

    let writes_before = store.write_count().await;
    assert_eq!(
        ana.compact_remote(ana.config().merge_remote_threshold)
            .await
            .expect("compact"),
        CompactionOutcome::NothingToFold
    );
    assert_eq!(store.write_count().await, writes_before);
}

#[tokio::test]
async fn compaction_bases_on_remote_snapshots_not_local_state() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let ana = loaded_engine(&store, "ana").await;
    let bo = loaded_engine(&store, "bo").await;

    add_storage(&ana, "Shelf").await;
    ana.push_local_pending().await.expect("push");
    ana.merge_remote_now().await.expect("compact");

    // Bo never saw Ana's blob but compacts its own on top of Ana's result.
    add_storage(&bo, "Bin").await;
    bo.push_local_pending().await.expect("push");
    assert_eq!(
        bo.merge_remote_now().await.expect("compact"),
        CompactionOutcome::Compacted {
            actions: 1,
            blobs: 1
        }
    );
    assert_eq!(unit_names(&bo).await, vec!["Bin", "Shelf"]);

    assert_eq!(
        ana.sync_local().await.expect("sync"),
        LocalSyncOutcome::Merged { actions: 1 }
    );
    assert_eq!(unit_names(&ana).await, unit_names(&bo).await);
}

#[tokio::test]
async fn tick_before_masters_load_does_nothing() {
    let store = Arc::new(MemoryBlobStore::new());
    let scheduler = SyncScheduler::new(Arc::new(engine_on(&store, "ana")));

    match scheduler.run_tick(TickTrigger::Manual).await {
        TickResult::Completed(report) => {
            assert_eq!(report.local, LocalSyncOutcome::NotReady);
            assert_eq!(report.compaction, CompactionOutcome::NotReady);
        }
        TickResult::Skipped => panic!("no other tick was running"),
    }
    assert_eq!(store.write_count().await, 0);
}

#[tokio::test]
async fn tick_errors_are_recorded_not_returned() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let ana = Arc::new(loaded_engine(&store, "ana").await);
    let bo = loaded_engine(&store, "bo").await;
    add_storage(&bo, "Shelf").await;
    bo.push_local_pending().await.expect("push");

    store.set_fail_reads(true);
    let scheduler = SyncScheduler::new(Arc::clone(&ana));
    let TickResult::Completed(report) = scheduler.run_tick(TickTrigger::Manual).await else {
        panic!("tick skipped");
    };
    assert_eq!(report.local, LocalSyncOutcome::Failed);
    assert_eq!(report.compaction, CompactionOutcome::Failed);
    assert_eq!(report.errors.len(), 2);
    assert!(ana.session().lock().await.status().last_error.is_some());

    store.set_fail_reads(false);
    let TickResult::Completed(report) = scheduler.run_tick(TickTrigger::Manual).await else {
        panic!("tick skipped");
    };
    assert_eq!(report.local, LocalSyncOutcome::Merged { actions: 1 });
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn background_loop_ticks_immediately_and_stops() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let ana = Arc::new(loaded_engine(&store, "ana").await);
    let bo = loaded_engine(&store, "bo").await;
    add_storage(&bo, "Shelf").await;
    bo.push_local_pending().await.expect("push");

    let scheduler = SyncScheduler::new(Arc::clone(&ana));
    scheduler.ensure_started().await;
    scheduler.ensure_started().await;
    assert!(scheduler.is_running().await);

    let mut merged = false;
    for _ in 0..50 {
        if unit_names(&ana).await == vec!["Shelf"] {
            merged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(merged, "startup tick should merge remote history");

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn discard_during_push_keeps_actions_dispatched_afterwards() {
    let memory = Arc::new(MemoryBlobStore::new());
    seed_masters(&memory).await;
    let gated = GatedStore::new(Arc::clone(&memory), Gate::LogBlobCreate);
    let engine = Arc::new(engine_over(Arc::clone(&gated) as Arc<dyn BlobStore>, "ana"));
    engine.load_masters().await.expect("load masters");
    let first = add_storage(&engine, "A").await;

    gated.arm();
    let push = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.push_local_pending().await }
    });
    gated.wait_entered().await;

    engine.discard_and_reload().await.expect("reload");
    let later = add_storage(&engine, "C").await;
    gated.release();
    let filename = push
        .await
        .expect("push task")
        .expect("push")
        .expect("blob written");

    let folder = actions_folder(&memory).await;
    let text = memory.content(&folder, &filename).await.expect("log blob");
    let blob = decode_log_blob(&text).expect("decode blob");
    assert_eq!(blob.actions.len(), 1);
    assert_eq!(blob.actions[0].kind.target_id(), first);

    let session = engine.session();
    let session = session.lock().await;
    assert!(session.has_unpublished_work());
    assert_eq!(session.pending_len(), 1);
    assert_eq!(session.pending().actions()[0].kind.target_id(), later);
    drop(session);
    assert_eq!(unit_names(&engine).await, vec!["C"]);

    // The next push publishes the surviving action.
    assert!(engine.push_local_pending().await.expect("push").is_some());
    assert_eq!(engine.session().lock().await.pending_len(), 0);
}

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    let memory = Arc::new(MemoryBlobStore::new());
    seed_masters(&memory).await;
    let gated = GatedStore::new(Arc::clone(&memory), Gate::List);
    let engine = Arc::new(engine_over(Arc::clone(&gated) as Arc<dyn BlobStore>, "ana"));
    engine.load_masters().await.expect("load masters");
    let scheduler = SyncScheduler::new(engine);

    gated.arm();
    let in_flight = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run_tick(TickTrigger::Periodic).await }
    });
    gated.wait_entered().await;

    assert_eq!(
        scheduler.run_tick(TickTrigger::Manual).await,
        TickResult::Skipped
    );

    gated.release();
    assert!(matches!(
        in_flight.await.expect("tick task"),
        TickResult::Completed(_)
    ));
    assert!(matches!(
        scheduler.run_tick(TickTrigger::Manual).await,
        TickResult::Completed(_)
    ));
}

#[tokio::test]
async fn tick_with_pending_work_only_flags_the_update() {
    let store = Arc::new(MemoryBlobStore::new());
    seed_masters(&store).await;
    let ana = Arc::new(loaded_engine(&store, "ana").await);
    let bo = loaded_engine(&store, "bo").await;

    add_storage(&ana, "Shelf").await;
    add_storage(&bo, "Bin").await;
    bo.push_local_pending().await.expect("push");

    let scheduler = SyncScheduler::new(Arc::clone(&ana));
    let TickResult::Completed(report) = scheduler.run_tick(TickTrigger::Periodic).await else {
        panic!("tick skipped");
    };
    assert_eq!(report.local, LocalSyncOutcome::UpdateAvailable);
    assert_eq!(report.compaction, CompactionOutcome::NothingToFold);
    assert!(report.errors.is_empty());

    let status = ana.session().lock().await.status();
    assert!(status.update_available);
    assert_eq!(status.pending_count, 1);
    assert_eq!(unit_names(&ana).await, vec!["Shelf"]);
}

#[tokio::test]
async fn masters_with_shared_photo_entries_load_and_compact() {
    let store = Arc::new(MemoryBlobStore::new());
    let time = now_millis() - chrono::Duration::hours(1);
    let root = root_folder(&store).await;
    let inventory = serde_json::json!({
        "version": 0,
        "time": to_iso(&time),
        "items": [
            {"id": "i-1", "name": "Bolt", "qty": 5, "storageUnitId": null,
             "meta": {"Photos": [{"id": "p-abc", "src": "data:image/png;base64,iVBO"}]}},
            {"id": "i-2", "name": "Nut", "qty": 1, "meta": {"Color": "red"}}
        ]
    });
    store
        .insert(&root, INVENTORY_FILENAME, &inventory.to_string())
        .await;
    store
        .insert(
            &root,
            STORAGE_FILENAME,
            &serde_json::to_string(&StorageSnapshot::initial(time)).expect("encode"),
        )
        .await;

    let ana = loaded_engine(&store, "ana").await;
    assert_eq!(ana.session().lock().await.inventory().items.len(), 2);

    add_storage(&ana, "Shelf").await;
    ana.push_local_pending().await.expect("push");
    assert_eq!(
        ana.merge_remote_now().await.expect("compact"),
        CompactionOutcome::Compacted {
            actions: 1,
            blobs: 1
        }
    );

    let rewritten: InventorySnapshot = serde_json::from_str(
        &store
            .content(&root, INVENTORY_FILENAME)
            .await
            .expect("inventory blob"),
    )
    .expect("rewritten inventory decodes strictly");
    assert_eq!(rewritten.items.len(), 2);
    let bolt = rewritten.item("i-1").expect("bolt kept");
    let Some(MetaValue::Photos(photos)) = bolt.meta.get(&ItemMetaKey::Photos) else {
        panic!("photos kept");
    };
    assert_eq!(photos[0].id, "p-abc");
    assert!(rewritten.item("i-2").expect("nut kept").meta.is_empty());

    assert_eq!(
        ana.merge_remote_now().await.expect("compact"),
        CompactionOutcome::NothingToFold
    );
}
