//! Naming and decoding of the shared blobs.
//!
//! Action-log blobs are named `actions_<time>.json` where `<time>` is the
//! ISO-8601 creation time with `:` and `.` replaced by `-`, for example
//! `actions_2025-09-22T08-45-01-964Z.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::errors::Result;
use crate::time::{iso_millis, parse_iso, to_iso};

/// Inventory snapshot blob in the root folder.
pub const INVENTORY_FILENAME: &str = "inventory.json";
/// Storage snapshot blob in the root folder.
pub const STORAGE_FILENAME: &str = "storage.json";
/// Name prefix shared by all action-log blobs.
pub const LOG_BLOB_PREFIX: &str = "actions_";
const LOG_BLOB_SUFFIX: &str = ".json";

/// `2025-09-22T08-45-01-964Z`
const ENCODED_TIME_LEN: usize = 24;

pub fn log_blob_name(time: &DateTime<Utc>) -> String {
    let encoded = to_iso(time).replace([':', '.'], "-");
    format!("{}{}{}", LOG_BLOB_PREFIX, encoded, LOG_BLOB_SUFFIX)
}

/// Recovers the creation time embedded in a log blob name.
///
/// Returns `None` for anything that is not exactly
/// `actions_YYYY-MM-DDTHH-MM-SS-SSSZ.json`.
pub fn parse_log_blob_name(name: &str) -> Option<DateTime<Utc>> {
    let encoded = name
        .strip_prefix(LOG_BLOB_PREFIX)?
        .strip_suffix(LOG_BLOB_SUFFIX)?;
    if encoded.len() != ENCODED_TIME_LEN || !encoded.is_ascii() {
        return None;
    }

    let bytes = encoded.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        let expected_ok = match index {
            4 | 7 | 13 | 16 | 19 => *byte == b'-',
            10 => *byte == b'T',
            23 => *byte == b'Z',
            _ => byte.is_ascii_digit(),
        };
        if !expected_ok {
            return None;
        }
    }

    // YYYY-MM-DDTHH:MM:SS.SSSZ
    let iso = format!(
        "{}:{}:{}.{}",
        &encoded[..13],
        &encoded[14..16],
        &encoded[17..19],
        &encoded[20..]
    );
    parse_iso(&iso).ok()
}

/// Content of one action-log blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogBlob {
    #[serde(with = "iso_millis")]
    pub time: DateTime<Utc>,
    pub actions: Vec<Action>,
}

/// A log blob decoded action by action.
#[derive(Debug, Clone, Default)]
pub struct DecodedLogBlob {
    pub time: Option<DateTime<Utc>>,
    pub actions: Vec<Action>,
    /// Actions in the blob that could not be decoded.
    pub rejected: usize,
}

#[derive(Deserialize)]
struct LooseLogBlob {
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    actions: Vec<serde_json::Value>,
}

/// Decodes a log blob, keeping every action that decodes on its own.
///
/// Fails only when the blob itself is not a JSON object of the expected shape.
pub fn decode_log_blob(text: &str) -> Result<DecodedLogBlob> {
    let loose: LooseLogBlob = serde_json::from_str(text)?;
    let mut decoded = DecodedLogBlob {
        time: loose.time.as_deref().and_then(|t| parse_iso(t).ok()),
        ..DecodedLogBlob::default()
    };

    for raw in loose.actions {
        match serde_json::from_value::<Action>(raw) {
            Ok(action) => decoded.actions.push(action),
            Err(err) => {
                decoded.rejected += 1;
                log::warn!("[InventorySync] Skipping undecodable action: {}", err);
            }
        }
    }

    Ok(decoded)
}
