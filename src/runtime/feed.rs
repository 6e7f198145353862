use std::sync::Arc;

use crate::bus::{ChangeEvent, Notifier, Subscription, SubscriptionHandle};
use crate::config::FeedConfig;
use crate::core::change::FileChange;
use crate::db::Database;
use crate::store::{ChangeStore, FileStateStore, SqliteChangeStore};
use crate::FeedError;

use super::event_log::EventLog;
use super::processor::BatchProcessor;
use super::queue::{ChangeQueue, EnqueueStatus};
use super::sequence::SequenceAssigner;

/// The assembled pipeline: queue → processor → file state, log, notifier.
///
/// Construction spawns the queue worker, so it must happen inside a tokio
/// runtime.
#[derive(Debug)]
pub struct ChangeFeed {
    files: FileStateStore,
    log: Arc<EventLog>,
    notifier: Arc<Notifier>,
    queue: ChangeQueue,
}

impl ChangeFeed {
    /// Open the SQLite store described by `config` and start the worker.
    pub fn open(config: &FeedConfig) -> Result<Self, FeedError> {
        let db = match config.database_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                tracing::info!("opening change database at {}", path.display());
                Database::open(&path)?
            }
            None => Database::open_in_memory()?,
        };
        let store: Arc<dyn ChangeStore> = Arc::new(SqliteChangeStore::new(Arc::new(db)));
        Ok(Self::with_store(store, config))
    }

    /// Build the pipeline over any [`ChangeStore`].
    pub fn with_store(store: Arc<dyn ChangeStore>, config: &FeedConfig) -> Self {
        let files = FileStateStore::new(store.clone());
        let sequencer = Arc::new(SequenceAssigner::new(store.clone()));
        let log = Arc::new(EventLog::new(store, sequencer));
        let notifier = Arc::new(Notifier::with_capacity(config.notify_capacity));
        let processor = Arc::new(BatchProcessor::new(
            files.clone(),
            log.clone(),
            notifier.clone(),
        ));
        let queue = ChangeQueue::start(processor, config.queue_capacity);
        Self {
            files,
            log,
            notifier,
            queue,
        }
    }

    pub fn enqueue(
        &self,
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        changes: Vec<FileChange>,
    ) -> EnqueueStatus {
        self.queue.enqueue(project_id, user_id, changes)
    }

    pub fn subscribe(&self, project_id: &str) -> Subscription {
        self.notifier.subscribe(project_id)
    }

    pub fn subscribe_with<F>(&self, project_id: &str, handler: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.notifier.subscribe_with(project_id, handler)
    }

    pub fn files(&self) -> &FileStateStore {
        &self.files
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    /// Drain queued batches and stop the worker.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}
