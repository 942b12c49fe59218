//! Explicit state container for the two local snapshots.
//!
//! State only changes through [`InventoraState::reduce`]; every variant of
//! [`StateAction`] produces a new state from the previous one.

use chrono::{DateTime, Utc};

use crate::actions::{apply_actions, Action};
use crate::inventory::{InventorySnapshot, StorageSnapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoraState {
    pub inventory: InventorySnapshot,
    pub storage: StorageSnapshot,
}

#[derive(Debug, Clone)]
pub enum StateAction {
    SetInventory(InventorySnapshot),
    SetStorage(StorageSnapshot),
    /// Optimistically applies one action. Snapshot times are left alone.
    ApplyAction(Action),
}

impl InventoraState {
    pub fn new(inventory: InventorySnapshot, storage: StorageSnapshot) -> Self {
        Self { inventory, storage }
    }

    pub fn reduce(self, action: StateAction) -> Self {
        match action {
            StateAction::SetInventory(inventory) => Self { inventory, ..self },
            StateAction::SetStorage(storage) => Self { storage, ..self },
            StateAction::ApplyAction(action) => {
                let replayed =
                    apply_actions(std::slice::from_ref(&action), &self.inventory, &self.storage);
                Self {
                    inventory: InventorySnapshot {
                        time: self.inventory.time,
                        ..replayed.inventory
                    },
                    storage: StorageSnapshot {
                        time: self.storage.time,
                        ..replayed.storage
                    },
                }
            }
        }
    }

    /// Both snapshots have been loaded.
    pub fn is_loaded(&self) -> bool {
        self.inventory.time.is_some() && self.storage.time.is_some()
    }

    /// The older of the two snapshot times; `None` until both are loaded.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match (self.inventory.time, self.storage.time) {
            (Some(inventory), Some(storage)) => Some(inventory.min(storage)),
            _ => None,
        }
    }

    /// Stamps both snapshots with `time`.
    pub fn with_time(self, time: DateTime<Utc>) -> Self {
        Self {
            inventory: InventorySnapshot {
                time: Some(time),
                ..self.inventory
            },
            storage: StorageSnapshot {
                time: Some(time),
                ..self.storage
            },
        }
    }
}
