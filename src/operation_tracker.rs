//! Operation Tracker Module
//!
//! Process-wide registry of named in-flight operations. The shutdown sequence
//! consults it to know when draining is complete. `execute_tracked` removes
//! the id on every exit path (success, error, panic, cancellation) through a
//! drop guard.

use dashmap::DashMap;
use std::future::Future;
use std::time::Instant;
use tracing::debug;

/// Registry of in-flight operation identifiers with their start times
#[derive(Debug, Default)]
pub struct OperationTracker {
    active: DashMap<String, Instant>,
}

/// Removes its operation id from the tracker on drop
pub struct OperationGuard<'a> {
    tracker: &'a OperationTracker,
    id: String,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.tracker.complete(&self.id);
    }
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    /// Mark an operation as in flight
    pub fn track(&self, id: &str) {
        self.active.insert(id.to_string(), Instant::now());
        debug!(
            "Tracking operation '{}' ({} active)",
            id,
            self.active.len()
        );
    }

    /// Mark an operation as finished. Completing an id that was never
    /// tracked is a no-op: a restart may have lost in-memory state, and
    /// callers must not have to care.
    pub fn complete(&self, id: &str) {
        match self.active.remove(id) {
            Some((_, started)) => debug!(
                "Completed operation '{}' after {:?} ({} active)",
                id,
                started.elapsed(),
                self.active.len()
            ),
            None => debug!("Completion for untracked operation '{}'", id),
        }
    }

    /// Track an operation for the lifetime of the returned guard
    pub fn guard(&self, id: &str) -> OperationGuard<'_> {
        self.track(id);
        OperationGuard {
            tracker: self,
            id: id.to_string(),
        }
    }

    /// Run an async operation under tracking; the id is removed however the
    /// operation exits
    pub async fn execute_tracked<F, T>(&self, id: &str, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.guard(id);
        operation.await
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }
}
