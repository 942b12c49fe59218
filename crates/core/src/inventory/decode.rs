//! Lenient decoding of master snapshot blobs.
//!
//! Snapshots are written by every client, including older ones, so a single
//! entity that does not match the current model must not take the whole
//! snapshot down. Meta entries that do not decode are dropped from their
//! entity; entities that still do not decode are dropped from the snapshot.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::meta::{ItemMetaKey, MetaKey, MetaValue, StorageMetaKey};
use super::model::{InventorySnapshot, Item, StorageSnapshot, StorageUnit};
use crate::errors::Result;
use crate::time::parse_iso;

/// A snapshot together with what had to be left out to decode it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedSnapshot<T> {
    pub snapshot: T,
    /// Entities that did not decode and were left out.
    pub rejected_entities: usize,
    /// Meta entries dropped from entities that were kept.
    pub rejected_meta: usize,
}

impl<T> DecodedSnapshot<T> {
    pub fn is_clean(&self) -> bool {
        self.rejected_entities == 0 && self.rejected_meta == 0
    }
}

/// Snapshot types that decode entity by entity.
pub trait LenientSnapshot: Sized {
    /// Fails only when `text` is not a JSON object.
    fn decode_lenient(text: &str) -> Result<DecodedSnapshot<Self>>;
}

impl LenientSnapshot for InventorySnapshot {
    fn decode_lenient(text: &str) -> Result<DecodedSnapshot<Self>> {
        let mut object: Map<String, Value> = serde_json::from_str(text)?;
        let mut rejected = Rejected::default();
        let items = decode_entities::<Item, ItemMetaKey>(object.remove("items"), &mut rejected);
        let snapshot = InventorySnapshot {
            version: version(&object),
            time: time(&object),
            items,
        };
        Ok(rejected.into_decoded(snapshot))
    }
}

impl LenientSnapshot for StorageSnapshot {
    fn decode_lenient(text: &str) -> Result<DecodedSnapshot<Self>> {
        let mut object: Map<String, Value> = serde_json::from_str(text)?;
        let mut rejected = Rejected::default();
        let units =
            decode_entities::<StorageUnit, StorageMetaKey>(object.remove("units"), &mut rejected);
        let snapshot = StorageSnapshot {
            version: version(&object),
            time: time(&object),
            units,
        };
        Ok(rejected.into_decoded(snapshot))
    }
}

#[derive(Default)]
struct Rejected {
    entities: usize,
    meta: usize,
}

impl Rejected {
    fn into_decoded<T>(self, snapshot: T) -> DecodedSnapshot<T> {
        DecodedSnapshot {
            snapshot,
            rejected_entities: self.entities,
            rejected_meta: self.meta,
        }
    }
}

fn version(object: &Map<String, Value>) -> i64 {
    object.get("version").and_then(Value::as_i64).unwrap_or(0)
}

fn time(object: &Map<String, Value>) -> Option<DateTime<Utc>> {
    match object.get("time") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = value.as_str().and_then(|text| parse_iso(text).ok());
            if parsed.is_none() {
                log::warn!("[InventorySync] Ignoring unreadable snapshot time {}", value);
            }
            parsed
        }
    }
}

fn decode_entities<E, K>(raw: Option<Value>, rejected: &mut Rejected) -> Vec<E>
where
    E: DeserializeOwned,
    K: MetaKey,
{
    let entries = match raw {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            log::warn!("[InventorySync] Snapshot entity list is not an array: {}", other);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| decode_entity::<E, K>(entry, rejected))
        .collect()
}

fn decode_entity<E, K>(mut entry: Value, rejected: &mut Rejected) -> Option<E>
where
    E: DeserializeOwned,
    K: MetaKey,
{
    if let Ok(entity) = E::deserialize(&entry) {
        return Some(entity);
    }

    // Retry with only the meta entries that decode on their own.
    let mut dropped = 0;
    if let Value::Object(fields) = &mut entry {
        match fields.get_mut("meta") {
            Some(Value::Object(meta)) => {
                let before = meta.len();
                *meta = std::mem::take(meta)
                    .into_iter()
                    .filter(|(key, value)| meta_entry_decodes::<K>(key, value))
                    .collect();
                dropped = before - meta.len();
            }
            Some(Value::Null) => {
                fields.remove("meta");
            }
            _ => {}
        }
    }

    match serde_json::from_value::<E>(entry) {
        Ok(entity) => {
            if dropped > 0 {
                log::warn!(
                    "[InventorySync] Dropped {} undecodable meta entries from a snapshot entity",
                    dropped
                );
            }
            rejected.meta += dropped;
            Some(entity)
        }
        Err(err) => {
            log::warn!("[InventorySync] Skipping undecodable snapshot entity: {}", err);
            rejected.entities += 1;
            None
        }
    }
}

fn meta_entry_decodes<K: MetaKey>(key: &str, value: &Value) -> bool {
    K::from_label(key).is_some() && MetaValue::deserialize(value).is_ok()
}
