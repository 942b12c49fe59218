//! Deterministic replay of an action list on top of base snapshots.
//!
//! Actions are folded in `(created_at, id)` order regardless of input order.
//! Fold steps are never re-validated: an action whose target no longer exists
//! is skipped, so replaying history from any older base is always safe.

use std::cmp::Ordering;

use indexmap::IndexMap;

use super::model::{Action, ActionKind};
use crate::inventory::{InventorySnapshot, Item, StorageSnapshot, StorageUnit};
use crate::time::now_millis;

const DEFAULT_ITEM_NAME: &str = "Item";
const DEFAULT_STORAGE_NAME: &str = "Storage";

/// Total order used to decide which of two actions wins.
pub fn compare_actions(a: &Action, b: &Action) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.as_bytes().cmp(b.id.as_bytes()))
}

pub fn sort_actions(actions: &mut [Action]) {
    actions.sort_by(compare_actions);
}

/// Output of [`apply_actions`].
///
/// Both snapshots carry the wall-clock time of the replay; callers that know
/// the real watermark overwrite it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replayed {
    pub inventory: InventorySnapshot,
    pub storage: StorageSnapshot,
    pub applied: usize,
    pub skipped: usize,
}

/// Outcome of one fold step.
enum Step {
    Applied,
    Skipped(&'static str),
}

struct Fold {
    items: IndexMap<String, Item>,
    units: IndexMap<String, StorageUnit>,
}

impl Fold {
    fn new(inventory: &InventorySnapshot, storage: &StorageSnapshot) -> Self {
        Self {
            items: inventory
                .items
                .iter()
                .map(|item| (item.id.clone(), item.clone()))
                .collect(),
            units: storage
                .units
                .iter()
                .map(|unit| (unit.id.clone(), unit.clone()))
                .collect(),
        }
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    fn unit_mut(&mut self, id: &str) -> Option<&mut StorageUnit> {
        self.units.get_mut(id)
    }

    fn apply(&mut self, kind: &ActionKind) -> Step {
        match kind {
            ActionKind::CreateItem(p) => {
                if self.items.contains_key(&p.id) {
                    return Step::Skipped("item already exists");
                }
                let storage_unit_id = p
                    .storage_unit_id
                    .as_ref()
                    .filter(|unit_id| self.units.contains_key(unit_id.as_str()))
                    .cloned();
                self.items.insert(
                    p.id.clone(),
                    Item {
                        id: p.id.clone(),
                        name: name_or(&p.name, DEFAULT_ITEM_NAME),
                        qty: p.initial_qty.max(0),
                        storage_unit_id,
                        meta: p.meta.clone(),
                    },
                );
                Step::Applied
            }

            ActionKind::DeleteItem(p) => match self.items.shift_remove(&p.id) {
                Some(_) => Step::Applied,
                None => Step::Skipped("item not found"),
            },

            ActionKind::RenameItem(p) => match self.item_mut(&p.id) {
                Some(_) if is_blank(&p.name) => Step::Skipped("empty name"),
                Some(item) => {
                    item.name = p.name.clone();
                    Step::Applied
                }
                None => Step::Skipped("item not found"),
            },

            ActionKind::SetQuantity(p) => match self.item_mut(&p.id) {
                Some(item) => {
                    item.qty = p.qty.max(0);
                    Step::Applied
                }
                None => Step::Skipped("item not found"),
            },

            ActionKind::AddCount(p) => match self.item_mut(&p.id) {
                Some(item) => {
                    item.qty = item.qty.saturating_add(p.amount).max(0);
                    Step::Applied
                }
                None => Step::Skipped("item not found"),
            },

            ActionKind::MoveItem(p) => {
                if !self.units.contains_key(&p.to_storage_id) {
                    return Step::Skipped("destination unit not found");
                }
                match self.item_mut(&p.id) {
                    Some(item) => {
                        item.storage_unit_id = Some(p.to_storage_id.clone());
                        Step::Applied
                    }
                    None => Step::Skipped("item not found"),
                }
            }

            ActionKind::SetItemMeta(p) => match self.item_mut(&p.id) {
                Some(item) => {
                    item.meta.insert(p.key, p.value.clone());
                    Step::Applied
                }
                None => Step::Skipped("item not found"),
            },

            ActionKind::RemoveItemMeta(p) => match self.item_mut(&p.id) {
                Some(item) => {
                    item.meta.remove(&p.key);
                    Step::Applied
                }
                None => Step::Skipped("item not found"),
            },

            ActionKind::CreateStorage(p) => {
                if self.units.contains_key(&p.id) {
                    return Step::Skipped("unit already exists");
                }
                self.units.insert(
                    p.id.clone(),
                    StorageUnit {
                        id: p.id.clone(),
                        name: name_or(&p.name, DEFAULT_STORAGE_NAME),
                        meta: p.meta.clone(),
                    },
                );
                Step::Applied
            }

            ActionKind::DeleteStorage(p) => {
                let removed = self.units.shift_remove(&p.id).is_some();
                // References are cleared even when the unit was already gone.
                for item in self.items.values_mut() {
                    if item.storage_unit_id.as_deref() == Some(p.id.as_str()) {
                        item.storage_unit_id = None;
                    }
                }
                if removed {
                    Step::Applied
                } else {
                    Step::Skipped("unit not found")
                }
            }

            ActionKind::RenameStorage(p) => match self.unit_mut(&p.id) {
                Some(_) if is_blank(&p.name) => Step::Skipped("empty name"),
                Some(unit) => {
                    unit.name = p.name.clone();
                    Step::Applied
                }
                None => Step::Skipped("unit not found"),
            },

            ActionKind::SetStorageMeta(p) => match self.unit_mut(&p.id) {
                Some(unit) => {
                    unit.meta.insert(p.key, p.value.clone());
                    Step::Applied
                }
                None => Step::Skipped("unit not found"),
            },

            ActionKind::RemoveStorageMeta(p) => match self.unit_mut(&p.id) {
                Some(unit) => {
                    unit.meta.remove(&p.key);
                    Step::Applied
                }
                None => Step::Skipped("unit not found"),
            },
        }
    }
}

fn is_blank(name: &str) -> bool {
    name.trim().is_empty()
}

/// Names are stored as written; only a blank one falls back to the default.
fn name_or(name: &str, fallback: &str) -> String {
    if is_blank(name) {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

/// Folds `actions` over the base snapshots and returns new snapshots.
///
/// Pure and total: the input slice is not reordered and the bases are not
/// touched. Output keeps each base's schema version.
pub fn apply_actions(
    actions: &[Action],
    base_inventory: &InventorySnapshot,
    base_storage: &StorageSnapshot,
) -> Replayed {
    let mut ordered: Vec<&Action> = actions.iter().collect();
    ordered.sort_by(|a, b| compare_actions(a, b));

    let mut fold = Fold::new(base_inventory, base_storage);
    let mut applied = 0;
    let mut skipped = 0;

    for action in ordered {
        match fold.apply(&action.kind) {
            Step::Applied => applied += 1,
            Step::Skipped(reason) => {
                skipped += 1;
                log::debug!(
                    "[InventorySync] Skipped {} {} during replay: {}",
                    action.action_type().as_str(),
                    action.id,
                    reason
                );
            }
        }
    }

    let time = Some(now_millis());
    Replayed {
        inventory: InventorySnapshot {
            version: base_inventory.version,
            time,
            items: fold.items.into_values().collect(),
        },
        storage: StorageSnapshot {
            version: base_storage.version,
            time,
            units: fold.units.into_values().collect(),
        },
        applied,
        skipped,
    }
}
