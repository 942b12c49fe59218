//! Error types for the drive sync crate.

use inventora_core::sync::{classify_http_status, SyncRetryClass};
use thiserror::Error;

/// Result type alias for drive sync operations.
pub type Result<T> = std::result::Result<T, DriveSyncError>;

/// Errors that can occur while talking to Drive or running a merge.
#[derive(Debug, Error)]
pub enum DriveSyncError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from Drive
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing folder, bad header value, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing, expired or revoked token)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Domain decode error (snapshot or action shape)
    #[error(transparent)]
    Core(#[from] inventora_core::Error),
}

impl DriveSyncError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => SyncRetryClass::Retryable,
            Self::Json(_) | Self::Core(_) => SyncRetryClass::Permanent,
            Self::InvalidRequest(_) => SyncRetryClass::Permanent,
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.retry_class() == SyncRetryClass::ReauthRequired
    }
}
