use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::change::FileChange;
use crate::core::record::{FileMetadata, FileRecord, LogEntry};
use crate::db::{queries, Database, DbError};

use super::{ChangeStore, StoreError};

/// [`ChangeStore`] backed by the local SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteChangeStore {
    db: Arc<Database>,
}

impl SqliteChangeStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

fn is_constraint_violation(err: &DbError) -> bool {
    matches!(
        err,
        DbError::Sqlite(rusqlite::Error::SqliteFailure(inner, _))
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl ChangeStore for SqliteChangeStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        path: &str,
        metadata: &FileMetadata,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        queries::upsert_file(
            &self.db,
            &queries::FileRow {
                project_id: project_id.to_string(),
                path: path.to_string(),
                size: metadata.size,
                mime_type: metadata.mime_type.clone(),
                content_hash: metadata.content_hash.clone(),
                modified_at: metadata.modified_at,
                owner_id: metadata.owner_id.clone(),
                deleted_by: None,
                deleted_at: None,
                created_at: now.clone(),
                updated_at: now,
            },
        )?;
        Ok(())
    }

    async fn soft_delete_file(
        &self,
        project_id: &str,
        path: &str,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let changed = queries::soft_delete_file(
            &self.db,
            project_id,
            path,
            deleted_by,
            &deleted_at.to_rfc3339(),
        )?;
        if !changed {
            tracing::debug!(project_id, path, "soft delete matched no live record");
        }
        Ok(())
    }

    async fn append_log_entry(
        &self,
        project_id: &str,
        seq: i64,
        change: &FileChange,
        created_at: DateTime<Utc>,
    ) -> Result<LogEntry, StoreError> {
        let row = queries::LogEntryRow {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            seq,
            path: change.path.clone(),
            op: change.op.to_string(),
            change_json: serde_json::to_string(change).map_err(DbError::from)?,
            created_at: created_at.to_rfc3339(),
        };
        queries::insert_log_entry(&self.db, &row).map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::Conflict(format!("seq {seq} already logged for project {project_id}"))
            } else {
                StoreError::Db(e)
            }
        })?;
        Ok(LogEntry {
            id: row.id,
            project_id: row.project_id,
            seq,
            change: change.clone(),
            created_at: row.created_at,
        })
    }

    async fn query_max_seq(&self, project_id: &str) -> Result<Option<i64>, StoreError> {
        Ok(queries::max_seq(&self.db, project_id)?)
    }

    async fn get_file(
        &self,
        project_id: &str,
        path: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        Ok(queries::get_file(&self.db, project_id, path)?.map(FileRecord::from))
    }

    async fn list_files(
        &self,
        project_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let rows = queries::list_files(&self.db, project_id, include_deleted)?;
        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    async fn log_entries_after(
        &self,
        project_id: &str,
        after_seq: i64,
    ) -> Result<Vec<LogEntry>, StoreError> {
        queries::get_log_entries_after_seq(&self.db, project_id, after_seq)?
            .into_iter()
            .map(|row| LogEntry::try_from(row).map_err(StoreError::from))
            .collect()
    }
}
