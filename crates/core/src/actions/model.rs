//! Action vocabulary and wire encoding.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::inventory::{ItemMetaKey, MetaMap, MetaValue, StorageMetaKey};
use crate::time::{now_millis, parse_iso, to_iso};

/// Actor recorded on actions created without a signed-in identity.
pub const ANONYMOUS_ACTOR: &str = "(anonymous)";

/// Closed set of mutation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateItem,
    DeleteItem,
    RenameItem,
    SetQuantity,
    AddCount,
    MoveItem,
    SetItemMeta,
    RemoveItemMeta,
    CreateStorage,
    DeleteStorage,
    RenameStorage,
    SetStorageMeta,
    RemoveStorageMeta,
}

impl ActionType {
    pub const ALL: [ActionType; 13] = [
        ActionType::CreateItem,
        ActionType::DeleteItem,
        ActionType::RenameItem,
        ActionType::SetQuantity,
        ActionType::AddCount,
        ActionType::MoveItem,
        ActionType::SetItemMeta,
        ActionType::RemoveItemMeta,
        ActionType::CreateStorage,
        ActionType::DeleteStorage,
        ActionType::RenameStorage,
        ActionType::SetStorageMeta,
        ActionType::RemoveStorageMeta,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::CreateItem => "create_item",
            ActionType::DeleteItem => "delete_item",
            ActionType::RenameItem => "rename_item",
            ActionType::SetQuantity => "set_quantity",
            ActionType::AddCount => "add_count",
            ActionType::MoveItem => "move_item",
            ActionType::SetItemMeta => "set_item_meta",
            ActionType::RemoveItemMeta => "remove_item_meta",
            ActionType::CreateStorage => "create_storage",
            ActionType::DeleteStorage => "delete_storage",
            ActionType::RenameStorage => "rename_storage",
            ActionType::SetStorageMeta => "set_storage_meta",
            ActionType::RemoveStorageMeta => "remove_storage_meta",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub initial_qty: i64,
    #[serde(default)]
    pub storage_unit_id: Option<String>,
    #[serde(default)]
    pub meta: MetaMap<ItemMetaKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStorage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub meta: MetaMap<StorageMetaKey>,
}

/// Payload of actions that only name their target (`delete_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetQuantity {
    pub id: String,
    pub qty: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCount {
    pub id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItem {
    pub id: String,
    pub to_storage_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMeta<K> {
    pub id: String,
    pub key: K,
    pub value: MetaValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMeta<K> {
    pub id: String,
    pub key: K,
}

/// A typed action payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    CreateItem(CreateItem),
    DeleteItem(Target),
    RenameItem(Rename),
    SetQuantity(SetQuantity),
    AddCount(AddCount),
    MoveItem(MoveItem),
    SetItemMeta(SetMeta<ItemMetaKey>),
    RemoveItemMeta(RemoveMeta<ItemMetaKey>),
    CreateStorage(CreateStorage),
    DeleteStorage(Target),
    RenameStorage(Rename),
    SetStorageMeta(SetMeta<StorageMetaKey>),
    RemoveStorageMeta(RemoveMeta<StorageMetaKey>),
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::CreateItem(_) => ActionType::CreateItem,
            ActionKind::DeleteItem(_) => ActionType::DeleteItem,
            ActionKind::RenameItem(_) => ActionType::RenameItem,
            ActionKind::SetQuantity(_) => ActionType::SetQuantity,
            ActionKind::AddCount(_) => ActionType::AddCount,
            ActionKind::MoveItem(_) => ActionType::MoveItem,
            ActionKind::SetItemMeta(_) => ActionType::SetItemMeta,
            ActionKind::RemoveItemMeta(_) => ActionType::RemoveItemMeta,
            ActionKind::CreateStorage(_) => ActionType::CreateStorage,
            ActionKind::DeleteStorage(_) => ActionType::DeleteStorage,
            ActionKind::RenameStorage(_) => ActionType::RenameStorage,
            ActionKind::SetStorageMeta(_) => ActionType::SetStorageMeta,
            ActionKind::RemoveStorageMeta(_) => ActionType::RemoveStorageMeta,
        }
    }

    /// Id of the item or storage unit the action targets.
    pub fn target_id(&self) -> &str {
        match self {
            ActionKind::CreateItem(p) => &p.id,
            ActionKind::CreateStorage(p) => &p.id,
            ActionKind::DeleteItem(p) | ActionKind::DeleteStorage(p) => &p.id,
            ActionKind::RenameItem(p) | ActionKind::RenameStorage(p) => &p.id,
            ActionKind::SetQuantity(p) => &p.id,
            ActionKind::AddCount(p) => &p.id,
            ActionKind::MoveItem(p) => &p.id,
            ActionKind::SetItemMeta(p) => &p.id,
            ActionKind::RemoveItemMeta(p) => &p.id,
            ActionKind::SetStorageMeta(p) => &p.id,
            ActionKind::RemoveStorageMeta(p) => &p.id,
        }
    }

    fn payload_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            ActionKind::CreateItem(p) => serde_json::to_value(p),
            ActionKind::DeleteItem(p) | ActionKind::DeleteStorage(p) => serde_json::to_value(p),
            ActionKind::RenameItem(p) | ActionKind::RenameStorage(p) => serde_json::to_value(p),
            ActionKind::SetQuantity(p) => serde_json::to_value(p),
            ActionKind::AddCount(p) => serde_json::to_value(p),
            ActionKind::MoveItem(p) => serde_json::to_value(p),
            ActionKind::SetItemMeta(p) => serde_json::to_value(p),
            ActionKind::RemoveItemMeta(p) => serde_json::to_value(p),
            ActionKind::CreateStorage(p) => serde_json::to_value(p),
            ActionKind::SetStorageMeta(p) => serde_json::to_value(p),
            ActionKind::RemoveStorageMeta(p) => serde_json::to_value(p),
        }
    }

    fn decode(action_type: ActionType, payload: serde_json::Value) -> Result<Self> {
        fn typed<T: DeserializeOwned>(
            action_type: ActionType,
            value: serde_json::Value,
        ) -> Result<T> {
            serde_json::from_value(value)
                .map_err(|e| Error::invalid_payload(action_type.as_str(), e))
        }

        Ok(match action_type {
            ActionType::CreateItem => ActionKind::CreateItem(typed(action_type, payload)?),
            ActionType::DeleteItem => ActionKind::DeleteItem(typed(action_type, payload)?),
            ActionType::RenameItem => ActionKind::RenameItem(typed(action_type, payload)?),
            ActionType::SetQuantity => ActionKind::SetQuantity(typed(action_type, payload)?),
            ActionType::AddCount => ActionKind::AddCount(typed(action_type, payload)?),
            ActionType::MoveItem => ActionKind::MoveItem(typed(action_type, payload)?),
            ActionType::SetItemMeta => ActionKind::SetItemMeta(typed(action_type, payload)?),
            ActionType::RemoveItemMeta => ActionKind::RemoveItemMeta(typed(action_type, payload)?),
            ActionType::CreateStorage => ActionKind::CreateStorage(typed(action_type, payload)?),
            ActionType::DeleteStorage => ActionKind::DeleteStorage(typed(action_type, payload)?),
            ActionType::RenameStorage => ActionKind::RenameStorage(typed(action_type, payload)?),
            ActionType::SetStorageMeta => ActionKind::SetStorageMeta(typed(action_type, payload)?),
            ActionType::RemoveStorageMeta => {
                ActionKind::RemoveStorageMeta(typed(action_type, payload)?)
            }
        })
    }
}

/// An immutable, client-generated mutation.
///
/// Wire shape: `{id, type, payload, createdAt, actorId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub created_at: DateTime<Utc>,
    pub actor_id: String,
}

impl Action {
    /// Builds a fresh action stamped with the current time.
    pub fn new(kind: ActionKind, actor_id: impl Into<String>) -> Self {
        Self {
            id: new_action_id(),
            kind,
            created_at: now_millis(),
            actor_id: actor_id.into(),
        }
    }

    /// Builds an action from already known parts (decoded history, fixtures).
    pub fn from_parts(
        id: impl Into<String>,
        kind: ActionKind,
        created_at: DateTime<Utc>,
        actor_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            created_at,
            actor_id: actor_id.into(),
        }
    }

    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAction {
    id: String,
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    created_at: String,
    #[serde(default = "anonymous_actor")]
    actor_id: String,
}

fn anonymous_actor() -> String {
    ANONYMOUS_ACTOR.to_string()
}

impl TryFrom<RawAction> for Action {
    type Error = Error;

    fn try_from(raw: RawAction) -> Result<Self> {
        let action_type = ActionType::parse(&raw.action_type)
            .ok_or_else(|| Error::UnsupportedAction(raw.action_type.clone()))?;
        let kind = ActionKind::decode(action_type, raw.payload)?;
        Ok(Action {
            id: raw.id,
            kind,
            created_at: parse_iso(&raw.created_at)?,
            actor_id: raw.actor_id,
        })
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let payload = match action.kind.payload_value() {
            Ok(value) => value,
            Err(err) => {
                log::error!(
                    "[InventorySync] Failed to encode payload of action {}: {}",
                    action.id,
                    err
                );
                serde_json::Value::Null
            }
        };
        RawAction {
            id: action.id,
            action_type: action.kind.action_type().as_str().to_string(),
            payload,
            created_at: to_iso(&action.created_at),
            actor_id: action.actor_id,
        }
    }
}

fn prefixed_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::now_v7().simple())
}

pub fn new_action_id() -> String {
    prefixed_id("a")
}

pub fn new_item_id() -> String {
    prefixed_id("i")
}

pub fn new_storage_id() -> String {
    prefixed_id("s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_names_match_wire_contract() {
        for action_type in ActionType::ALL {
            let encoded = serde_json::to_string(&action_type).expect("serialize type");
            assert_eq!(encoded, format!("\"{}\"", action_type.as_str()));
            assert_eq!(ActionType::parse(action_type.as_str()), Some(action_type));
        }
    }

    #[test]
    fn action_wire_shape() {
        let action = Action::from_parts(
            "a-1",
            ActionKind::MoveItem(MoveItem {
                id: "i-1".to_string(),
                to_storage_id: "s-1".to_string(),
            }),
            parse_iso("2025-09-22T08:45:01.964Z").expect("time"),
            "ana@example.com",
        );

        let json = serde_json::to_value(&action).expect("encode action");
        assert_eq!(
            json,
            serde_json::json!({
                "id": "a-1",
                "type": "move_item",
                "payload": {"id": "i-1", "toStorageId": "s-1"},
                "createdAt": "2025-09-22T08:45:01.964Z",
                "actorId": "ana@example.com"
            })
        );

        let decoded: Action = serde_json::from_value(json).expect("decode action");
        assert_eq!(decoded, action);
    }

    #[test]
    fn decoding_defaults_missing_actor_to_anonymous() {
        let json = serde_json::json!({
            "id": "a-2",
            "type": "create_item",
            "payload": {"id": "i-9", "name": "Nut", "initialQty": 3, "storageUnitId": null, "meta": {}},
            "createdAt": "2025-09-22T08:45:01.964Z"
        });
        let action: Action = serde_json::from_value(json).expect("decode action");
        assert_eq!(action.actor_id, ANONYMOUS_ACTOR);
        assert_eq!(action.kind.target_id(), "i-9");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let json = serde_json::json!({
            "id": "a-3",
            "type": "paint_item",
            "payload": {"id": "i-1"},
            "createdAt": "2025-09-22T08:45:01.964Z",
            "actorId": "x"
        });
        assert!(serde_json::from_value::<Action>(json).is_err());
    }

    #[test]
    fn payload_mismatch_is_an_error() {
        let json = serde_json::json!({
            "id": "a-4",
            "type": "add_count",
            "payload": {"id": "i-1"},
            "createdAt": "2025-09-22T08:45:01.964Z",
            "actorId": "x"
        });
        assert!(serde_json::from_value::<Action>(json).is_err());
    }

    #[test]
    fn generated_ids_carry_entity_prefixes() {
        assert!(new_action_id().starts_with("a-"));
        assert!(new_item_id().starts_with("i-"));
        assert!(new_storage_id().starts_with("s-"));
        assert_ne!(new_item_id(), new_item_id());
    }
}
