//! Background poll loop.
//!
//! At most one tick runs at a time: a tick requested while another is in
//! flight is dropped, never queued.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use inventora_core::sync::{
    CompactionOutcome, LocalSyncOutcome, SyncTickReport, TickResult, TickTrigger,
};

use super::SyncEngine;

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    tick_slot: Mutex<()>,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

fn jitter(max: Duration) -> Duration {
    let bound = max.as_millis() as u64;
    if bound == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            tick_slot: Mutex::new(()),
            background_task: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Runs one tick unless another one is in flight.
    pub async fn run_tick(&self, trigger: TickTrigger) -> TickResult {
        let Ok(_slot) = self.tick_slot.try_lock() else {
            log::debug!("[InventorySync] Tick already in flight, skipping {:?}", trigger);
            return TickResult::Skipped;
        };
        TickResult::Completed(self.tick(trigger).await)
    }

    /// One tick: local check, then compaction with the inactivity threshold.
    /// Errors are logged and recorded, never returned.
    async fn tick(&self, trigger: TickTrigger) -> SyncTickReport {
        let started_at = Utc::now();
        let started = std::time::Instant::now();
        let mut errors = Vec::new();

        let local = match self.engine.sync_local().await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.engine.note_error("Local merge", &err).await;
                errors.push(err.to_string());
                LocalSyncOutcome::Failed
            }
        };

        let compaction = if local == LocalSyncOutcome::NotReady {
            CompactionOutcome::NotReady
        } else {
            match self
                .engine
                .compact_remote(self.engine.config().merge_remote_threshold)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.engine.note_error("Merge to Drive", &err).await;
                    errors.push(err.to_string());
                    CompactionOutcome::Failed
                }
            }
        };

        let report = SyncTickReport {
            trigger,
            local,
            compaction,
            started_at,
            duration_ms: started.elapsed().as_millis() as i64,
            errors,
        };
        log::debug!(
            "[InventorySync] Tick complete trigger={:?} local={:?} compaction={:?} duration_ms={}",
            report.trigger,
            report.local,
            report.compaction,
            report.duration_ms
        );
        report
    }

    /// Starts the poll loop if it is not running. The first tick runs
    /// immediately.
    pub async fn ensure_started(self: &Arc<Self>) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut trigger = TickTrigger::Startup;
            loop {
                scheduler.run_tick(trigger).await;
                trigger = TickTrigger::Periodic;

                let config = scheduler.engine.config();
                let delay = config.poll_interval + jitter(config.poll_jitter);
                tokio::time::sleep(delay).await;
            }
        });
        log::info!("[InventorySync] Background sync started");
        *guard = Some(handle);
    }

    /// Stops the poll loop after any in-flight tick has finished.
    pub async fn stop(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.take() {
            let _slot = self.tick_slot.lock().await;
            handle.abort();
            log::info!("[InventorySync] Background sync stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
