//! Sync engine configuration.

use std::time::Duration;

use inventora_core::sync::{
    ACTIONS_FOLDER_NAME, DEFAULT_ROOT_FOLDER_NAME, MERGE_REMOTE_THRESHOLD_SECS,
    SYNC_POLL_INTERVAL_SECS, SYNC_POLL_JITTER_MS,
};

const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const DEFAULT_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to each poll interval.
    pub poll_jitter: Duration,
    /// Minimum age of a log blob before compaction folds it.
    pub merge_remote_threshold: Duration,
    pub root_folder_name: String,
    pub actions_folder_name: String,
    pub drive_api_url: String,
    pub drive_upload_url: String,
    pub userinfo_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(SYNC_POLL_INTERVAL_SECS),
            poll_jitter: Duration::from_millis(SYNC_POLL_JITTER_MS),
            merge_remote_threshold: Duration::from_secs(MERGE_REMOTE_THRESHOLD_SECS),
            root_folder_name: DEFAULT_ROOT_FOLDER_NAME.to_string(),
            actions_folder_name: ACTIONS_FOLDER_NAME.to_string(),
            drive_api_url: DEFAULT_DRIVE_API_URL.to_string(),
            drive_upload_url: DEFAULT_DRIVE_UPLOAD_URL.to_string(),
            userinfo_url: DEFAULT_USERINFO_URL.to_string(),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_url(name: &str) -> Option<String> {
    env_string(name).map(|v| v.trim_end_matches('/').to_string())
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env_string(name)?;
    match raw.parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[InventorySync] Ignoring {}={}: not a number", name, raw);
            None
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `INVENTORA_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_u64("INVENTORA_POLL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            poll_jitter: env_u64("INVENTORA_POLL_JITTER_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_jitter),
            merge_remote_threshold: env_u64("INVENTORA_MERGE_THRESHOLD_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.merge_remote_threshold),
            root_folder_name: env_string("INVENTORA_FOLDER_NAME")
                .unwrap_or(defaults.root_folder_name),
            actions_folder_name: defaults.actions_folder_name,
            drive_api_url: env_url("INVENTORA_DRIVE_API_URL").unwrap_or(defaults.drive_api_url),
            drive_upload_url: env_url("INVENTORA_DRIVE_UPLOAD_URL")
                .unwrap_or(defaults.drive_upload_url),
            userinfo_url: env_url("INVENTORA_USERINFO_URL").unwrap_or(defaults.userinfo_url),
        }
    }

    /// Points every endpoint at one base URL. Used against local mock servers.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.drive_api_url = format!("{}/drive/v3", base);
        self.drive_upload_url = format!("{}/upload/drive/v3", base);
        self.userinfo_url = format!("{}/userinfo", base);
        self
    }
}
