use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::change::FileChange;
use crate::core::mime::mime_type_for_path;
use crate::db::queries::{FileRow, LogEntryRow};
use crate::db::DbError;

/// Metadata written by an upsert. `modified_at` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: i64,
    pub mime_type: String,
    pub content_hash: Option<String>,
    pub modified_at: i64,
    pub owner_id: String,
}

impl FileMetadata {
    /// Metadata for a create/update change: MIME from the path extension,
    /// size defaulting to 0 and modification time defaulting to `now`.
    pub fn from_change(change: &FileChange, owner_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            size: change.size.unwrap_or(0),
            mime_type: mime_type_for_path(&change.path).to_string(),
            content_hash: change.hash.clone(),
            modified_at: change.mtime.unwrap_or_else(|| now.timestamp_millis()),
            owner_id: owner_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub deleted_by: String,
    pub deleted_at: String,
}

/// Latest known state of one (project, path). A tombstoned record still
/// carries the metadata it had when it was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub project_id: String,
    pub path: String,
    pub size: i64,
    pub mime_type: String,
    pub content_hash: Option<String>,
    pub modified_at: i64,
    pub owner_id: String,
    pub tombstone: Option<Tombstone>,
    pub created_at: String,
    pub updated_at: String,
}

impl FileRecord {
    pub fn is_deleted(&self) -> bool {
        self.tombstone.is_some()
    }

    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            size: self.size,
            mime_type: self.mime_type.clone(),
            content_hash: self.content_hash.clone(),
            modified_at: self.modified_at,
            owner_id: self.owner_id.clone(),
        }
    }
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        let tombstone = match (row.deleted_by, row.deleted_at) {
            (Some(deleted_by), Some(deleted_at)) => Some(Tombstone {
                deleted_by,
                deleted_at,
            }),
            _ => None,
        };
        Self {
            project_id: row.project_id,
            path: row.path,
            size: row.size,
            mime_type: row.mime_type,
            content_hash: row.content_hash,
            modified_at: row.modified_at,
            owner_id: row.owner_id,
            tombstone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// One immutable entry of a project's change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub project_id: String,
    pub seq: i64,
    pub change: FileChange,
    pub created_at: String,
}

impl TryFrom<LogEntryRow> for LogEntry {
    type Error = DbError;

    fn try_from(row: LogEntryRow) -> Result<Self, Self::Error> {
        let change: FileChange = serde_json::from_str(&row.change_json)?;
        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            seq: row.seq,
            change,
            created_at: row.created_at,
        })
    }
}
