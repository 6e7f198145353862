//! Shared test doubles.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::change::FileChange;
use crate::core::record::{FileMetadata, FileRecord, LogEntry};
use crate::db::Database;
use crate::runtime::ChangeQueue;
use crate::store::{ChangeStore, SqliteChangeStore, StoreError};

pub fn memory_store() -> SqliteChangeStore {
    SqliteChangeStore::new(Arc::new(
        Database::open_in_memory().expect("in-memory DB"),
    ))
}

/// Wraps the SQLite store and injects failures, panics and latency on demand.
/// Also records how many mutating calls overlap.
pub struct FaultyStore {
    inner: SqliteChangeStore,
    fail_paths: Mutex<HashSet<String>>,
    panic_paths: Mutex<HashSet<String>>,
    fail_append: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: memory_store(),
            fail_paths: Mutex::new(HashSet::new()),
            panic_paths: Mutex::new(HashSet::new()),
            fail_append: AtomicBool::new(false),
            write_delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn fail_path(&self, path: &str) {
        self.fail_paths.lock().unwrap().insert(path.to_string());
    }

    pub fn panic_on_path(&self, path: &str) {
        self.panic_paths.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, path: &str) -> Result<(), StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.panic_paths.lock().unwrap().contains(path) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("injected panic for {path}");
        }
        if self.fail_paths.lock().unwrap().contains(path) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(format!("injected failure for {path}")));
        }
        Ok(())
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChangeStore for FaultyStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        path: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StoreError> {
        self.enter(path).await?;
        let result = self.inner.upsert_file(project_id, path, metadata).await;
        self.exit();
        result
    }

    async fn soft_delete_file(
        &self,
        project_id: &str,
        path: &str,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.enter(path).await?;
        let result = self
            .inner
            .soft_delete_file(project_id, path, deleted_by, deleted_at)
            .await;
        self.exit();
        result
    }

    async fn append_log_entry(
        &self,
        project_id: &str,
        seq: i64,
        change: &FileChange,
        created_at: DateTime<Utc>,
    ) -> Result<LogEntry, StoreError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected append failure".to_string()));
        }
        self.inner
            .append_log_entry(project_id, seq, change, created_at)
            .await
    }

    async fn query_max_seq(&self, project_id: &str) -> Result<Option<i64>, StoreError> {
        self.inner.query_max_seq(project_id).await
    }

    async fn get_file(
        &self,
        project_id: &str,
        path: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        self.inner.get_file(project_id, path).await
    }

    async fn list_files(
        &self,
        project_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<FileRecord>, StoreError> {
        self.inner.list_files(project_id, include_deleted).await
    }

    async fn log_entries_after(
        &self,
        project_id: &str,
        after_seq: i64,
    ) -> Result<Vec<LogEntry>, StoreError> {
        self.inner.log_entries_after(project_id, after_seq).await
    }
}

/// Poll until the queue worker has finished `count` batches.
pub async fn wait_for_processed(queue: &ChangeQueue, count: u64) {
    for _ in 0..500 {
        if queue.processed_batches() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "queue processed {} batches, expected {count}",
        queue.processed_batches()
    );
}
