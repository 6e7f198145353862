use rusqlite::Connection;

use super::DbError;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE files (
    project_id    TEXT NOT NULL,
    path          TEXT NOT NULL,
    size          INTEGER NOT NULL DEFAULT 0,
    mime_type     TEXT NOT NULL,
    content_hash  TEXT,
    modified_at   INTEGER NOT NULL,
    owner_id      TEXT NOT NULL,
    deleted_by    TEXT,
    deleted_at    TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (project_id, path)
);

CREATE TABLE change_log (
    id           TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL,
    seq          INTEGER NOT NULL,
    path         TEXT NOT NULL,
    op           TEXT NOT NULL,
    change_json  TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    UNIQUE (project_id, seq)
);
"#,
    },
    Migration {
        version: 2,
        sql: r#"
CREATE INDEX idx_files_project_deleted ON files(project_id, deleted_at);
CREATE INDEX idx_change_log_project_path ON change_log(project_id, path);
"#,
    },
];

pub(super) fn run_migrations(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );",
    )?;

    let applied: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM _migrations ORDER BY version")?;
        let result = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        result
    };

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!("applying migration v{}", migration.version);

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DbError::Migration(format!("v{}: {e}", migration.version)))?;
        tx.execute(
            "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
            rusqlite::params![migration.version],
        )?;
        tx.commit()?;
    }

    Ok(())
}
