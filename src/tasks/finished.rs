use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::debug;

use super::{TaskEntry, TaskIdCache};
use crate::error::StoreResult;
use crate::store::{keys, load_json, save_json, KeyValueStore};

/// Ids of tasks already completed, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishedSet {
    ids: Vec<String>,
}

impl FinishedSet {
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        let ids: Vec<String> = load_json(store, keys::FINISHED_TASKS).unwrap_or_default();
        Self { ids }
    }

    /// Persist, keeping only the newest `max_ids` entries.
    pub fn save<S: KeyValueStore + ?Sized>(&mut self, store: &S, max_ids: usize) -> StoreResult<()> {
        if self.ids.len() > max_ids {
            let excess = self.ids.len() - max_ids;
            self.ids.drain(..excess);
        }
        save_json(store, keys::FINISHED_TASKS, &self.ids)
    }

    /// Returns false when the id was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn to_lookup(&self) -> HashSet<String> {
        self.ids.iter().cloned().collect()
    }

    /// Drop finished tasks and entries without an href. Entries whose href
    /// carries no task id are kept.
    pub fn prune(&self, list: Vec<TaskEntry>, ids: &TaskIdCache) -> Vec<TaskEntry> {
        if list.is_empty() {
            return list;
        }
        let lookup = self.to_lookup();
        list.into_iter()
            .filter(|task| {
                if task.href.is_empty() {
                    return false;
                }
                match ids.get(&task.href) {
                    Some(id) => !lookup.contains(&id),
                    None => true,
                }
            })
            .collect()
    }
}

/// Change notice fanned out to every cache handle sharing a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedChanged;

/// Broadcast channel standing in for cross-tab messaging.
#[derive(Debug, Clone)]
pub struct FinishedSync {
    tx: broadcast::Sender<FinishedChanged>,
}

impl FinishedSync {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FinishedChanged> {
        self.tx.subscribe()
    }

    /// Best effort: no subscribers is not an error.
    pub fn notify(&self) {
        match self.tx.send(FinishedChanged) {
            Ok(n) => debug!(receivers = n, "finished-set change broadcast"),
            Err(_) => debug!("finished-set change with no listeners"),
        }
    }
}

impl Default for FinishedSync {
    fn default() -> Self {
        Self::new()
    }
}
