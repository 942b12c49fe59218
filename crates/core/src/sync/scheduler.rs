//! Core scheduler constants for inventory sync.

/// Poll cadence in seconds.
pub const SYNC_POLL_INTERVAL_SECS: u64 = 10;

/// Maximum jitter (milliseconds) added to each poll interval.
pub const SYNC_POLL_JITTER_MS: u64 = 1_000;

/// Log blobs younger than this are not folded into the shared snapshots.
pub const MERGE_REMOTE_THRESHOLD_SECS: u64 = 5 * 60;

/// Root folder holding the snapshot blobs.
pub const DEFAULT_ROOT_FOLDER_NAME: &str = "InventoraApp";

/// Subfolder of the root folder holding the action-log blobs.
pub const ACTIONS_FOLDER_NAME: &str = "actions";

/// Entries kept in the user-visible merge log.
pub const MERGE_LOG_CAPACITY: usize = 200;
