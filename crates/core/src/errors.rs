//! Error types for the core crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding actions, snapshots and log blobs.
#[derive(Debug, Error)]
pub enum Error {
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A timestamp that is not RFC 3339 / ISO-8601
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// An action whose `type` is outside the known vocabulary
    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),

    /// An action payload that does not match its type's contract
    #[error("Invalid payload for {action_type}: {message}")]
    InvalidPayload {
        action_type: String,
        message: String,
    },
}

impl Error {
    pub fn invalid_timestamp(value: impl Into<String>) -> Self {
        Self::InvalidTimestamp(value.into())
    }

    pub fn invalid_payload(action_type: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidPayload {
            action_type: action_type.into(),
            message: message.to_string(),
        }
    }
}
