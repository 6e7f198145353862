//! Events published to project subscribers.

use serde::{Deserialize, Serialize};

use crate::core::change::FileChange;
use crate::core::record::LogEntry;

pub const EVENT_FILE_CHANGED: &str = "file.changed";

/// A logged change, as seen by subscribers. Serialized with a
/// `"type": "file.changed"` tag so transports can multiplex it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "file.changed")]
pub struct ChangeEvent {
    pub project_id: String,
    pub seq: i64,
    pub change: FileChange,
}

impl From<&LogEntry> for ChangeEvent {
    fn from(entry: &LogEntry) -> Self {
        Self {
            project_id: entry.project_id.clone(),
            seq: entry.seq,
            change: entry.change.clone(),
        }
    }
}
