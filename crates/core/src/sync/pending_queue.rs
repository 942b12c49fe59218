//! Queue of locally created actions awaiting publication.

use std::collections::HashSet;

use crate::actions::Action;

/// Append-only queue of actions created locally and not yet published.
#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    actions: Vec<Action>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, action: Action) {
        log::debug!(
            "[InventorySync] Enqueued {} {} ({} pending)",
            action.action_type().as_str(),
            action.id,
            self.actions.len() + 1
        );
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Removes the queued actions whose ids appear in `published` and returns
    /// them in queue order.
    ///
    /// Actions enqueued after the push copy was taken stay queued, and so do
    /// actions that replaced a discarded queue in the meantime.
    pub fn remove_published(&mut self, published: &[Action]) -> Vec<Action> {
        let ids: HashSet<&str> = published.iter().map(|action| action.id.as_str()).collect();
        let (removed, kept): (Vec<Action>, Vec<Action>) = std::mem::take(&mut self.actions)
            .into_iter()
            .partition(|action| ids.contains(action.id.as_str()));
        self.actions = kept;
        removed
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}
