//! Per-task progress table with snapshot and streaming reads

use crate::task::{TaskKey, TaskStatus};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Progress of one (analyst, ticker) task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEntry {
    pub percent: u8,
    pub message: String,
    pub status: &'static str,
    pub round: u32,
}

/// A progress change, as pushed to streaming readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub analyst: String,
    pub ticker: String,
    #[serde(flatten)]
    pub entry: ProgressEntry,
}

/// `analyst -> ticker -> progress`
pub type ProgressSnapshot = BTreeMap<String, BTreeMap<String, ProgressEntry>>;

/// Concurrently readable progress table keyed by (analyst, ticker)
///
/// Percent never decreases within a round and a terminal entry is never
/// overwritten. Entries of different tasks are independent.
#[derive(Debug)]
pub struct ProgressTracker {
    entries: RwLock<HashMap<TaskKey, ProgressEntry>>,
    updates: broadcast::Sender<ProgressUpdate>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            updates,
        }
    }

    /// Register every task of a round as queued (0%)
    ///
    /// Starting a new round replaces the previous round's entries.
    pub fn begin_round<'a>(&self, round: u32, keys: impl IntoIterator<Item = &'a TaskKey>) {
        let queued: Vec<ProgressUpdate> = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.clear();
            keys.into_iter()
                .map(|key| {
                    let entry = ProgressEntry {
                        percent: 0,
                        message: "queued".to_string(),
                        status: TaskStatus::Pending.label(),
                        round,
                    };
                    entries.insert(key.clone(), entry.clone());
                    update_for(key, entry)
                })
                .collect()
        };

        for update in queued {
            let _ = self.updates.send(update);
        }
    }

    /// Record progress for a task
    ///
    /// Returns `false` when the update was dropped: unknown key, a lower
    /// percent than already recorded, or an entry that is already terminal.
    pub fn update(
        &self,
        key: &TaskKey,
        percent: u8,
        message: impl Into<String>,
        status: &TaskStatus,
    ) -> bool {
        let update = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = entries.get_mut(key) else {
                return false;
            };
            if is_terminal_label(entry.status) || percent < entry.percent {
                return false;
            }

            entry.percent = percent.min(100);
            entry.message = message.into();
            entry.status = status.label();
            update_for(key, entry.clone())
        };

        let _ = self.updates.send(update);
        true
    }

    /// Current progress of one task
    pub fn get(&self, key: &TaskKey) -> Option<ProgressEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Point-in-time copy of the whole table
    pub fn snapshot(&self) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot::new();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        for (key, entry) in entries.iter() {
            snapshot
                .entry(key.analyst_id.clone())
                .or_default()
                .insert(key.ticker.to_string(), entry.clone());
        }
        snapshot
    }

    /// Subscribe to subsequent updates
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.updates.subscribe()
    }
}

fn update_for(key: &TaskKey, entry: ProgressEntry) -> ProgressUpdate {
    ProgressUpdate {
        analyst: key.analyst_id.clone(),
        ticker: key.ticker.to_string(),
        entry,
    }
}

fn is_terminal_label(label: &str) -> bool {
    matches!(label, "succeeded" | "failed" | "timed_out")
}
