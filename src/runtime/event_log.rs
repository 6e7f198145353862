use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::change::FileChange;
use crate::core::record::LogEntry;
use crate::store::{ChangeStore, StoreError};

use super::sequence::SequenceAssigner;

/// Append-only, per-project change log.
pub struct EventLog {
    store: Arc<dyn ChangeStore>,
    sequencer: Arc<SequenceAssigner>,
}

impl EventLog {
    pub fn new(store: Arc<dyn ChangeStore>, sequencer: Arc<SequenceAssigner>) -> Self {
        Self { store, sequencer }
    }

    pub fn sequencer(&self) -> &Arc<SequenceAssigner> {
        &self.sequencer
    }

    pub async fn append(
        &self,
        project_id: &str,
        seq: i64,
        change: &FileChange,
        when: DateTime<Utc>,
    ) -> Result<LogEntry, StoreError> {
        self.store
            .append_log_entry(project_id, seq, change, when)
            .await
    }

    /// Assign the next sequence number and append `change` under it, holding
    /// the project's sequence lock for both steps.
    pub async fn record(&self, project_id: &str, change: &FileChange) -> Result<LogEntry, StoreError> {
        let result = {
            let _guard = self.sequencer.lock(project_id).await;
            match self.sequencer.next(project_id).await {
                Ok(seq) => self.append(project_id, seq, change, Utc::now()).await,
                Err(e) => Err(e),
            }
        };
        self.sequencer.release(project_id);
        result
    }

    /// Entries with `seq > after_seq`, oldest first.
    pub async fn entries_after(
        &self,
        project_id: &str,
        after_seq: i64,
    ) -> Result<Vec<LogEntry>, StoreError> {
        self.store.log_entries_after(project_id, after_seq).await
    }

    /// Highest sequence logged for the project, 0 if none.
    pub async fn latest_seq(&self, project_id: &str) -> Result<i64, StoreError> {
        Ok(self.store.query_max_seq(project_id).await?.unwrap_or(0))
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").finish_non_exhaustive()
    }
}
