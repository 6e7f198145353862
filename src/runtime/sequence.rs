use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{ChangeStore, StoreError};

/// Hands out per-project sequence numbers as `max(seq) + 1`.
///
/// `next` alone is a plain read: two callers for the same project can get the
/// same number. Callers that go on to append hold [`SequenceAssigner::lock`]
/// across the read and the append.
pub struct SequenceAssigner {
    store: Arc<dyn ChangeStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SequenceAssigner {
    pub fn new(store: Arc<dyn ChangeStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    pub async fn next(&self, project_id: &str) -> Result<i64, StoreError> {
        let current = self.store.query_max_seq(project_id).await?;
        Ok(current.map_or(1, |max| max + 1))
    }

    pub async fn lock(&self, project_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(project_id.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Forget the project's lock once nobody holds or waits on it. Call after
    /// the guard from [`SequenceAssigner::lock`] is dropped.
    pub fn release(&self, project_id: &str) {
        self.locks
            .remove_if(project_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Projects with a live sequence lock.
    pub fn tracked_projects(&self) -> usize {
        self.locks.len()
    }
}

impl std::fmt::Debug for SequenceAssigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAssigner")
            .field("projects", &self.tracked_projects())
            .finish_non_exhaustive()
    }
}
