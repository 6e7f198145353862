use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file change reported by a watcher.
///
/// `mtime` is epoch milliseconds. An empty `path` is tolerated on input and
/// skipped during processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub op: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
            hash: None,
            mtime: None,
            size: None,
        }
    }

    pub fn create(path: impl Into<String>) -> Self {
        Self::new(path, ChangeOp::Create)
    }

    pub fn update(path: impl Into<String>) -> Self {
        Self::new(path, ChangeOp::Update)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(path, ChangeOp::Delete)
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn is_delete(&self) -> bool {
        self.op == ChangeOp::Delete
    }
}

/// An ordered group of changes submitted by one enqueue call.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub project_id: String,
    pub user_id: String,
    pub changes: Vec<FileChange>,
    pub received_at: DateTime<Utc>,
}

impl ChangeBatch {
    pub fn new(
        project_id: impl Into<String>,
        user_id: impl Into<String>,
        changes: Vec<FileChange>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            user_id: user_id.into(),
            changes,
            received_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Time spent waiting between enqueue and `now`, never negative.
    pub fn queued_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.received_at).max(Duration::zero())
    }
}
