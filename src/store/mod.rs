//! Persistence surface for file state and the change log.
//!
//! [`ChangeStore`] is the seam to the storage layer. The bundled
//! [`SqliteChangeStore`] implements it over [`Database`]; the
//! [`FileStateStore`] wrapper is what the batch processor talks to.

mod file_state;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::change::FileChange;
use crate::core::record::{FileMetadata, FileRecord, LogEntry};
use crate::db::DbError;

pub use file_state::FileStateStore;
pub use sqlite::SqliteChangeStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait ChangeStore: Send + Sync {
    /// Insert or replace the record for (project, path). Last write wins.
    async fn upsert_file(
        &self,
        project_id: &str,
        path: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StoreError>;

    /// Tombstone the record for (project, path). Deleting an already-deleted
    /// or unknown path succeeds without changing anything.
    async fn soft_delete_file(
        &self,
        project_id: &str,
        path: &str,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Append an immutable log entry. Reusing a sequence number for the same
    /// project is a [`StoreError::Conflict`].
    async fn append_log_entry(
        &self,
        project_id: &str,
        seq: i64,
        change: &FileChange,
        created_at: DateTime<Utc>,
    ) -> Result<LogEntry, StoreError>;

    async fn query_max_seq(&self, project_id: &str) -> Result<Option<i64>, StoreError>;

    async fn get_file(&self, project_id: &str, path: &str)
        -> Result<Option<FileRecord>, StoreError>;

    async fn list_files(
        &self,
        project_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<FileRecord>, StoreError>;

    async fn log_entries_after(
        &self,
        project_id: &str,
        after_seq: i64,
    ) -> Result<Vec<LogEntry>, StoreError>;
}
