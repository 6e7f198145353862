use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DbError};

// ---------------------------------------------------------------------------
// Row types: flat structs that map directly to table columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRow {
    pub project_id: String,
    pub path: String,
    pub size: i64,
    pub mime_type: String,
    pub content_hash: Option<String>,
    pub modified_at: i64,
    pub owner_id: String,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntryRow {
    pub id: String,
    pub project_id: String,
    pub seq: i64,
    pub path: String,
    pub op: String,
    pub change_json: String,
    pub created_at: String,
}

const FILE_COLUMNS: &str = "project_id, path, size, mime_type, content_hash, modified_at, owner_id, deleted_by, deleted_at, created_at, updated_at";

const LOG_COLUMNS: &str = "id, project_id, seq, path, op, change_json, created_at";

fn file_row(row: &Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        project_id: row.get(0)?,
        path: row.get(1)?,
        size: row.get(2)?,
        mime_type: row.get(3)?,
        content_hash: row.get(4)?,
        modified_at: row.get(5)?,
        owner_id: row.get(6)?,
        deleted_by: row.get(7)?,
        deleted_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn log_entry_row(row: &Row<'_>) -> rusqlite::Result<LogEntryRow> {
    Ok(LogEntryRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        seq: row.get(2)?,
        path: row.get(3)?,
        op: row.get(4)?,
        change_json: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// ---------------------------------------------------------------------------
// File queries
// ---------------------------------------------------------------------------

/// Insert or overwrite the row for (project_id, path). Last write wins; an
/// upsert over a tombstoned row clears the tombstone. `created_at` of an
/// existing row is preserved, and a live row whose columns already match is
/// left untouched so `updated_at` only moves on a real change.
pub fn upsert_file(db: &Database, row: &FileRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO files (project_id, path, size, mime_type, content_hash, modified_at, owner_id, deleted_by, deleted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, ?8, ?9)
         ON CONFLICT(project_id, path)
         DO UPDATE SET size = excluded.size,
                       mime_type = excluded.mime_type,
                       content_hash = excluded.content_hash,
                       modified_at = excluded.modified_at,
                       owner_id = excluded.owner_id,
                       deleted_by = NULL,
                       deleted_at = NULL,
                       updated_at = excluded.updated_at
         WHERE files.size IS NOT excluded.size
            OR files.mime_type IS NOT excluded.mime_type
            OR files.content_hash IS NOT excluded.content_hash
            OR files.modified_at IS NOT excluded.modified_at
            OR files.owner_id IS NOT excluded.owner_id
            OR files.deleted_at IS NOT NULL",
        params![
            row.project_id,
            row.path,
            row.size,
            row.mime_type,
            row.content_hash,
            row.modified_at,
            row.owner_id,
            row.created_at,
            row.updated_at,
        ],
    )?;
    Ok(())
}

/// Set tombstone fields on a live row. Returns `true` when a row changed;
/// an already-deleted or unknown path changes nothing.
pub fn soft_delete_file(
    db: &Database,
    project_id: &str,
    path: &str,
    deleted_by: &str,
    deleted_at: &str,
) -> Result<bool, DbError> {
    let conn = db.conn();
    let changed = conn.execute(
        "UPDATE files SET deleted_by = ?3, deleted_at = ?4, updated_at = ?4
         WHERE project_id = ?1 AND path = ?2 AND deleted_at IS NULL",
        params![project_id, path, deleted_by, deleted_at],
    )?;
    Ok(changed > 0)
}

pub fn get_file(db: &Database, project_id: &str, path: &str) -> Result<Option<FileRow>, DbError> {
    let conn = db.conn();
    let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 AND path = ?2");
    let row = conn
        .query_row(&sql, params![project_id, path], file_row)
        .optional()?;
    Ok(row)
}

pub fn list_files(
    db: &Database,
    project_id: &str,
    include_deleted: bool,
) -> Result<Vec<FileRow>, DbError> {
    let conn = db.conn();
    let sql = if include_deleted {
        format!("SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 ORDER BY path ASC")
    } else {
        format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE project_id = ?1 AND deleted_at IS NULL ORDER BY path ASC"
        )
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![project_id], file_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Change log queries
// ---------------------------------------------------------------------------

pub fn insert_log_entry(db: &Database, row: &LogEntryRow) -> Result<(), DbError> {
    let conn = db.conn();
    conn.execute(
        "INSERT INTO change_log (id, project_id, seq, path, op, change_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.id,
            row.project_id,
            row.seq,
            row.path,
            row.op,
            row.change_json,
            row.created_at,
        ],
    )?;
    Ok(())
}

pub fn max_seq(db: &Database, project_id: &str) -> Result<Option<i64>, DbError> {
    let conn = db.conn();
    let seq: Option<i64> = conn.query_row(
        "SELECT MAX(seq) FROM change_log WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(seq)
}

pub fn get_log_entries_after_seq(
    db: &Database,
    project_id: &str,
    after_seq: i64,
) -> Result<Vec<LogEntryRow>, DbError> {
    let conn = db.conn();
    let sql = format!(
        "SELECT {LOG_COLUMNS} FROM change_log WHERE project_id = ?1 AND seq > ?2 ORDER BY seq ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![project_id, after_seq], log_entry_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
