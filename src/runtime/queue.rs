use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::core::change::{ChangeBatch, FileChange};

use super::processor::BatchProcessor;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueStatus {
    /// The batch is queued for the worker.
    Accepted,
    /// No changes were given; nothing was queued.
    Empty,
    /// The queue is at capacity; the batch was dropped.
    Full,
    /// The queue was shut down; the batch was dropped.
    Closed,
}

impl EnqueueStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// FIFO of pending batches drained by exactly one worker task.
///
/// The worker is spawned by [`ChangeQueue::start`] and lives until
/// [`ChangeQueue::shutdown`] (or until the queue is dropped), so there is never
/// more than one drain loop no matter how many producers enqueue concurrently.
/// Pending batches live only in memory.
pub struct ChangeQueue {
    tx: mpsc::Sender<ChangeBatch>,
    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    processed: Arc<AtomicU64>,
}

impl ChangeQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(processor: Arc<BatchProcessor>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let processed = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(run_worker(processor, rx, shutdown_rx, processed.clone()));
        Self {
            tx,
            shutdown_tx,
            worker: Mutex::new(Some(worker)),
            processed,
        }
    }

    /// Queue `changes` for processing without waiting for it.
    pub fn enqueue(
        &self,
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        changes: Vec<FileChange>,
    ) -> EnqueueStatus {
        if changes.is_empty() {
            return EnqueueStatus::Empty;
        }

        let batch = ChangeBatch::new(project_id, user_id, changes);
        match self.tx.try_send(batch) {
            Ok(()) => EnqueueStatus::Accepted,
            Err(mpsc::error::TrySendError::Full(batch)) => {
                tracing::warn!(
                    project_id = %batch.project_id,
                    changes = batch.len(),
                    "change queue full, dropping batch"
                );
                EnqueueStatus::Full
            }
            Err(mpsc::error::TrySendError::Closed(batch)) => {
                tracing::warn!(
                    project_id = %batch.project_id,
                    changes = batch.len(),
                    "change queue closed, dropping batch"
                );
                EnqueueStatus::Closed
            }
        }
    }

    /// Batches queued and not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity().saturating_sub(self.tx.capacity())
    }

    /// Batches the worker has finished, including ones that panicked.
    pub fn processed_batches(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stop accepting batches, let the worker drain what is already queued,
    /// and wait for it to exit.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("change worker terminated abnormally: {e}");
            }
        }
    }
}

impl std::fmt::Debug for ChangeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeQueue")
            .field("pending", &self.pending())
            .field("processed", &self.processed_batches())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    processor: Arc<BatchProcessor>,
    mut rx: mpsc::Receiver<ChangeBatch>,
    mut shutdown_rx: watch::Receiver<bool>,
    processed: Arc<AtomicU64>,
) {
    tracing::info!("change worker started");
    loop {
        tokio::select! {
            biased;
            batch = rx.recv() => match batch {
                Some(batch) => {
                    processor.process_guarded(&batch).await;
                    processed.fetch_add(1, Ordering::Release);
                }
                None => break,
            },
            _ = shutdown_rx.changed() => {
                rx.close();
                while let Some(batch) = rx.recv().await {
                    processor.process_guarded(&batch).await;
                    processed.fetch_add(1, Ordering::Release);
                }
                break;
            }
        }
    }
    tracing::info!("change worker stopped");
}
