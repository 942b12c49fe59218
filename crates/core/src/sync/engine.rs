//! Core helpers for sync engine orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Retry policy classification for API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// What started a scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickTrigger {
    Startup,
    Periodic,
    Manual,
}

/// How the local view related to the remote log during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalSyncOutcome {
    /// Masters not loaded yet; nothing was checked.
    NotReady,
    UpToDate,
    /// Remote history was folded into the local view.
    Merged { actions: usize },
    /// Remote is ahead but unpublished local work blocks the merge.
    UpdateAvailable,
    /// The local view changed while the tick was reading; retried next tick.
    Stale,
    Failed,
}

/// Result of one compaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionOutcome {
    NotReady,
    /// No log blob was both newer than the remote watermark and old enough.
    NothingToFold,
    Compacted { actions: usize, blobs: usize },
    Failed,
}

/// Lightweight tick report emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTickReport {
    pub trigger: TickTrigger,
    pub local: LocalSyncOutcome,
    pub compaction: CompactionOutcome,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Returned by a manual tick request that found a tick already in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TickResult {
    Completed(SyncTickReport),
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(429), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(401), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(403), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(404), SyncRetryClass::Permanent);
    }

    #[test]
    fn tick_report_serializes_for_hosts() {
        let report = SyncTickReport {
            trigger: TickTrigger::Manual,
            local: LocalSyncOutcome::Merged { actions: 2 },
            compaction: CompactionOutcome::NothingToFold,
            started_at: DateTime::<Utc>::UNIX_EPOCH,
            duration_ms: 12,
            errors: Vec::new(),
        };
        let json = serde_json::to_value(TickResult::Completed(report)).expect("encode");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["local"]["merged"]["actions"], 2);
        assert_eq!(json["compaction"], "nothing_to_fold");
        assert!(json.get("errors").is_none());
    }
}
