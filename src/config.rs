use std::path::PathBuf;

use crate::runtime::DEFAULT_QUEUE_CAPACITY;

pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;
pub const DATABASE_FILE_NAME: &str = "changefeed.db";

const DATA_DIR_ENV: &str = "CHANGEFEED_DATA_DIR";
const QUEUE_CAPACITY_ENV: &str = "CHANGEFEED_QUEUE_CAPACITY";
const NOTIFY_CAPACITY_ENV: &str = "CHANGEFEED_NOTIFY_CAPACITY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Directory holding the database file. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub queue_capacity: usize,
    pub notify_capacity: usize,
}

impl FeedConfig {
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        }
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::in_memory()
        }
    }

    /// Build from `CHANGEFEED_*` environment variables, falling back to
    /// `$HOME/.changefeed` for the data directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            data_dir: Some(data_dir(&lookup)),
            queue_capacity: capacity(&lookup, QUEUE_CAPACITY_ENV, DEFAULT_QUEUE_CAPACITY)?,
            notify_capacity: capacity(&lookup, NOTIFY_CAPACITY_ENV, DEFAULT_NOTIFY_CAPACITY)?,
        })
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(DATABASE_FILE_NAME))
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = lookup(DATA_DIR_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    if let Some(home) = lookup("HOME").or_else(|| lookup("USERPROFILE")) {
        return PathBuf::from(home).join(".changefeed");
    }

    PathBuf::from(".changefeed")
}

fn capacity(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(default);
    }
    match trimmed.parse::<usize>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
