//! Live runs, addressable by id for progress reads and cancellation

use crate::progress::{ProgressSnapshot, ProgressTracker, ProgressUpdate};
use chrono::{DateTime, Utc};
use panel_core::ValidationError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// What a run is computing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Analysis,
    RoundTable,
}

/// Handles shared between a running request and its observers
#[derive(Debug, Clone)]
pub struct RunEntry {
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub tracker: Arc<ProgressTracker>,
    pub cancel: CancellationToken,
}

/// Registry of in-flight runs
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<Uuid, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run; ids of live runs cannot be reused
    pub fn register(&self, id: Uuid, kind: RunKind) -> Result<RunEntry, ValidationError> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(&id) {
            return Err(ValidationError::RunInProgress(id.to_string()));
        }

        let entry = RunEntry {
            kind,
            started_at: Utc::now(),
            tracker: Arc::new(ProgressTracker::new()),
            cancel: CancellationToken::new(),
        };
        runs.insert(id, entry.clone());
        Ok(entry)
    }

    pub fn get(&self, id: &Uuid) -> Option<RunEntry> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(id).cloned()
    }

    /// Cancel a live run; `false` when the id is unknown
    pub fn cancel(&self, id: &Uuid) -> bool {
        match self.get(id) {
            Some(entry) => {
                info!(run_id = %id, "Cancelling run");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn progress(&self, id: &Uuid) -> Option<ProgressSnapshot> {
        self.get(id).map(|entry| entry.tracker.snapshot())
    }

    pub fn subscribe(&self, id: &Uuid) -> Option<broadcast::Receiver<ProgressUpdate>> {
        self.get(id).map(|entry| entry.tracker.subscribe())
    }

    pub fn remove(&self, id: &Uuid) -> Option<RunEntry> {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        runs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps a run registered for the lifetime of its request
///
/// Dropping the guard (completion or an abandoned request future) cancels
/// whatever is still in flight and unregisters the run.
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    id: Uuid,
    entry: RunEntry,
}

impl RunGuard {
    pub fn register(
        registry: &Arc<RunRegistry>,
        id: Uuid,
        kind: RunKind,
    ) -> Result<Self, ValidationError> {
        let entry = registry.register(id, kind)?;
        Ok(Self {
            registry: Arc::clone(registry),
            id,
            entry,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.entry.tracker
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.entry.cancel
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.entry.cancel.cancel();
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = RunRegistry::new();
        let id = Uuid::new_v4();

        registry.register(id, RunKind::Analysis).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).map(|e| e.kind), Some(RunKind::Analysis));
        assert!(registry.progress(&id).unwrap().is_empty());

        assert_eq!(
            registry.register(id, RunKind::RoundTable).unwrap_err(),
            ValidationError::RunInProgress(id.to_string())
        );
    }

    #[test]
    fn test_cancel_unknown_run() {
        let registry = RunRegistry::new();
        assert!(!registry.cancel(&Uuid::new_v4()));
        assert!(registry.subscribe(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_guard_drop_cancels_and_unregisters() {
        let registry = Arc::new(RunRegistry::new());
        let id = Uuid::new_v4();

        let guard = RunGuard::register(&registry, id, RunKind::Analysis).unwrap();
        let token = guard.cancel_token().clone();
        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());

        drop(guard);
        assert!(registry.is_empty());
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_poisoned_lock_still_unregisters() {
        let registry = RunRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id, RunKind::Analysis).unwrap();

        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _runs = registry.runs.write().unwrap();
            panic!("writer died holding the lock");
        }));
        assert!(poisoned.is_err());
        assert!(registry.runs.is_poisoned());

        assert_eq!(registry.len(), 1);
        assert!(registry.cancel(&id));
        assert!(registry.remove(&id).is_some());
        assert!(registry.is_empty());
    }
}
