use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;

use crate::bus::{ChangeEvent, Notifier};
use crate::core::change::{ChangeBatch, FileChange};
use crate::core::record::FileMetadata;
use crate::store::FileStateStore;

use super::event_log::EventLog;

/// Per-batch tally of what happened to each change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub applied: usize,
    pub skipped: usize,
    pub store_failures: usize,
    pub log_failures: usize,
}

enum ChangeOutcome {
    Applied,
    Skipped,
    StoreFailed,
    LogFailed,
}

/// Applies batches one change at a time: state store, then log, then notify.
///
/// A failing change is logged and abandoned; the rest of the batch still runs.
/// Nothing is rolled back or retried, so a log failure after a successful
/// store write leaves the two diverged.
pub struct BatchProcessor {
    files: FileStateStore,
    log: Arc<EventLog>,
    notifier: Arc<Notifier>,
}

impl BatchProcessor {
    pub fn new(files: FileStateStore, log: Arc<EventLog>, notifier: Arc<Notifier>) -> Self {
        Self {
            files,
            log,
            notifier,
        }
    }

    pub async fn process_batch(&self, batch: &ChangeBatch) -> BatchReport {
        let mut report = BatchReport::default();
        for change in &batch.changes {
            match self.apply_change(batch, change).await {
                ChangeOutcome::Applied => report.applied += 1,
                ChangeOutcome::Skipped => report.skipped += 1,
                ChangeOutcome::StoreFailed => report.store_failures += 1,
                ChangeOutcome::LogFailed => report.log_failures += 1,
            }
        }
        tracing::debug!(
            project_id = %batch.project_id,
            applied = report.applied,
            skipped = report.skipped,
            store_failures = report.store_failures,
            log_failures = report.log_failures,
            queued_ms = batch.queued_for(Utc::now()).num_milliseconds(),
            "batch processed"
        );
        report
    }

    /// [`BatchProcessor::process_batch`] with a panic boundary. A panicking
    /// batch is logged and yields `None`.
    pub async fn process_guarded(&self, batch: &ChangeBatch) -> Option<BatchReport> {
        match AssertUnwindSafe(self.process_batch(batch)).catch_unwind().await {
            Ok(report) => Some(report),
            Err(panic) => {
                tracing::error!(
                    project_id = %batch.project_id,
                    changes = batch.len(),
                    "batch processing panicked: {}",
                    panic_message(panic.as_ref())
                );
                None
            }
        }
    }

    async fn apply_change(&self, batch: &ChangeBatch, change: &FileChange) -> ChangeOutcome {
        if change.path.is_empty() {
            tracing::debug!(project_id = %batch.project_id, op = %change.op, "skipping change without path");
            return ChangeOutcome::Skipped;
        }

        let project_id = batch.project_id.as_str();
        let now = Utc::now();
        let stored = if change.is_delete() {
            self.files
                .soft_delete(project_id, &change.path, &batch.user_id, now)
                .await
        } else {
            let metadata = FileMetadata::from_change(change, &batch.user_id, now);
            self.files.upsert(project_id, &change.path, &metadata).await
        };
        if let Err(e) = stored {
            tracing::warn!(
                project_id,
                path = %change.path,
                op = %change.op,
                "failed to apply change to file state: {e}"
            );
            return ChangeOutcome::StoreFailed;
        }

        let entry = match self.log.record(project_id, change).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(
                    project_id,
                    path = %change.path,
                    op = %change.op,
                    "file state updated but change log append failed: {e}"
                );
                return ChangeOutcome::LogFailed;
            }
        };

        self.notifier.publish(project_id, ChangeEvent::from(&entry));
        ChangeOutcome::Applied
    }
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor").finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
