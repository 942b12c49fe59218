//! Inventory entities and their materialized snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::meta::{ItemMetaKey, MetaMap, StorageMetaKey};
use crate::time::iso_millis;

/// Schema version written into freshly created snapshot blobs.
pub const SNAPSHOT_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub qty: i64,
    #[serde(default)]
    pub storage_unit_id: Option<String>,
    #[serde(default)]
    pub meta: MetaMap<ItemMetaKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUnit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub meta: MetaMap<StorageMetaKey>,
}

/// Materialized items, valid for all action history up to `time`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    #[serde(default)]
    pub version: i64,
    #[serde(default, with = "iso_millis::option")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// Materialized storage units, valid for all action history up to `time`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub version: i64,
    #[serde(default, with = "iso_millis::option")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub units: Vec<StorageUnit>,
}

impl InventorySnapshot {
    /// Empty snapshot used when the shared folder has no inventory blob yet.
    pub fn initial(time: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION,
            time: Some(time),
            items: Vec::new(),
        }
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.item(id).is_some()
    }
}

impl StorageSnapshot {
    /// Empty snapshot used when the shared folder has no storage blob yet.
    pub fn initial(time: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_SCHEMA_VERSION,
            time: Some(time),
            units: Vec::new(),
        }
    }

    pub fn unit(&self, id: &str) -> Option<&StorageUnit> {
        self.units.iter().find(|unit| unit.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.unit(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_wire_shape_matches_blob_contract() {
        let json = r#"{
            "version": 1,
            "time": "2025-09-22T08:45:01.964Z",
            "items": [
                {"id": "i-1", "name": "Bolt", "qty": 5, "storageUnitId": null, "meta": {"Tags": "m3"}}
            ]
        }"#;
        let snapshot: InventorySnapshot = serde_json::from_str(json).expect("decode snapshot");
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].storage_unit_id, None);

        let encoded = serde_json::to_value(&snapshot).expect("encode snapshot");
        assert_eq!(encoded["time"], "2025-09-22T08:45:01.964Z");
        assert_eq!(encoded["items"][0]["storageUnitId"], serde_json::Value::Null);
    }

    #[test]
    fn snapshot_without_time_decodes() {
        let snapshot: StorageSnapshot =
            serde_json::from_str(r#"{"units": []}"#).expect("decode snapshot");
        assert_eq!(snapshot.time, None);
        assert_eq!(snapshot.version, 0);
    }
}
