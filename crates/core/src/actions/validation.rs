//! Per-type structural and business validation of actions.
//!
//! Validation runs against the caller's current snapshots, never mutates
//! them, and reports problems as a field-keyed map instead of failing fast.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use super::model::{Action, ActionKind, RemoveMeta, SetMeta};
use crate::inventory::{InventorySnapshot, MetaKey, MetaMap, StorageSnapshot};

/// Payload fields that can carry a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Id,
    Name,
    Qty,
    StorageUnitId,
    Amount,
    ToStorageId,
    Key,
}

/// Structured validation failure: `{field: message, meta: {key: message}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Error)]
#[error("action failed validation ({} field errors, {} meta errors)", .fields.len(), .meta.len())]
pub struct ValidationErrors {
    #[serde(flatten)]
    pub fields: BTreeMap<Field, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.meta.is_empty()
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn meta_error(&self, label: &str) -> Option<&str> {
        self.meta.get(label).map(String::as_str)
    }

    fn add(&mut self, field: Field, message: &str) {
        self.fields.insert(field, message.to_string());
    }

    fn add_meta(&mut self, label: &str, message: impl Into<String>) {
        self.meta.insert(label.to_string(), message.into());
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

const ID_EXISTS: &str = "ID already exists.";
const ID_MISSING: &str = "ID does not exist.";
const NAME_EMPTY: &str = "Name cannot be empty.";
const NAME_UNCHANGED: &str = "Cannot rename to the same name.";
const META_UNCHANGED: &str = "Values haven't changed.";

/// Validates `action` against the current local snapshots.
pub fn validate(
    action: &Action,
    inventory: &InventorySnapshot,
    storage: &StorageSnapshot,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    match &action.kind {
        ActionKind::CreateItem(p) => {
            if inventory.contains(&p.id) {
                errors.add(Field::Id, ID_EXISTS);
            }
            if p.name.trim().is_empty() {
                errors.add(Field::Name, NAME_EMPTY);
            }
            if p.initial_qty < 0 {
                errors.add(Field::Qty, "Quantity cannot be negative.");
            }
            if let Some(unit_id) = p.storage_unit_id.as_deref() {
                if !storage.contains(unit_id) {
                    errors.add(Field::StorageUnitId, "The storage unit does not exist.");
                }
            }
            validate_meta_map(&p.meta, &mut errors);
        }

        ActionKind::DeleteItem(p) => {
            if !inventory.contains(&p.id) {
                errors.add(Field::Id, ID_MISSING);
            }
        }

        ActionKind::RenameItem(p) => {
            match inventory.item(&p.id) {
                None => errors.add(Field::Id, ID_MISSING),
                Some(item) if item.name == p.name.trim() => errors.add(Field::Name, NAME_UNCHANGED),
                Some(_) => {}
            }
            if p.name.trim().is_empty() {
                errors.add(Field::Name, NAME_EMPTY);
            }
        }

        ActionKind::SetQuantity(p) => {
            match inventory.item(&p.id) {
                None => errors.add(Field::Id, ID_MISSING),
                Some(item) if item.qty == p.qty => {
                    errors.add(Field::Qty, "Cannot set quantity to the same number.")
                }
                Some(_) => {}
            }
            if p.qty < 0 {
                errors.add(Field::Qty, "Quantity cannot be negative.");
            }
        }

        ActionKind::AddCount(p) => {
            if !inventory.contains(&p.id) {
                errors.add(Field::Id, ID_MISSING);
            }
            if p.amount == 0 {
                errors.add(Field::Amount, "Amount cannot be zero.");
            }
        }

        ActionKind::MoveItem(p) => {
            let item = inventory.item(&p.id);
            if item.is_none() {
                errors.add(Field::Id, ID_MISSING);
            }
            if !storage.contains(&p.to_storage_id) {
                errors.add(Field::ToStorageId, ID_MISSING);
            }
            if item.and_then(|it| it.storage_unit_id.as_deref()) == Some(p.to_storage_id.as_str()) {
                errors.add(Field::ToStorageId, "Cannot move to the same storage unit.");
            }
        }

        ActionKind::SetItemMeta(p) => {
            let current = inventory.item(&p.id).map(|item| &item.meta);
            validate_set_meta(p, current, &mut errors);
        }

        ActionKind::RemoveItemMeta(p) => {
            let current = inventory.item(&p.id).map(|item| &item.meta);
            validate_remove_meta(p, current, "This meta is not in the item.", &mut errors);
        }

        ActionKind::CreateStorage(p) => {
            if storage.contains(&p.id) {
                errors.add(Field::Id, ID_EXISTS);
            }
            if p.name.trim().is_empty() {
                errors.add(Field::Name, NAME_EMPTY);
            }
            validate_meta_map(&p.meta, &mut errors);
        }

        ActionKind::DeleteStorage(p) => {
            if !storage.contains(&p.id) {
                errors.add(Field::Id, ID_MISSING);
            }
        }

        ActionKind::RenameStorage(p) => {
            match storage.unit(&p.id) {
                None => errors.add(Field::Id, ID_MISSING),
                Some(unit) if unit.name == p.name.trim() => errors.add(Field::Name, NAME_UNCHANGED),
                Some(_) => {}
            }
            if p.name.trim().is_empty() {
                errors.add(Field::Name, NAME_EMPTY);
            }
        }

        ActionKind::SetStorageMeta(p) => {
            let current = storage.unit(&p.id).map(|unit| &unit.meta);
            validate_set_meta(p, current, &mut errors);
        }

        ActionKind::RemoveStorageMeta(p) => {
            let current = storage.unit(&p.id).map(|unit| &unit.meta);
            validate_remove_meta(
                p,
                current,
                "This meta is not in the storage unit.",
                &mut errors,
            );
        }
    }

    errors.into_result()
}

fn validate_meta_map<K: MetaKey>(meta: &MetaMap<K>, errors: &mut ValidationErrors) {
    for (key, value) in meta {
        if let Err(message) = key.validate(value) {
            errors.add_meta(key.label(), message);
        }
    }
}

/// `current` is the target entity's meta, `None` when the entity is unknown.
fn validate_set_meta<K: MetaKey>(
    p: &SetMeta<K>,
    current: Option<&MetaMap<K>>,
    errors: &mut ValidationErrors,
) {
    if current.is_none() {
        errors.add(Field::Id, ID_MISSING);
    }
    match p.key.validate(&p.value) {
        Err(message) => errors.add_meta(p.key.label(), message),
        Ok(()) => {
            if current.and_then(|meta| meta.get(&p.key)) == Some(&p.value) {
                errors.add_meta(p.key.label(), META_UNCHANGED);
            }
        }
    }
}

fn validate_remove_meta<K: MetaKey>(
    p: &RemoveMeta<K>,
    current: Option<&MetaMap<K>>,
    absent_message: &str,
    errors: &mut ValidationErrors,
) {
    match current {
        None => errors.add(Field::Id, ID_MISSING),
        Some(meta) if !meta.contains_key(&p.key) => errors.add(Field::Key, absent_message),
        Some(_) => {}
    }
}
