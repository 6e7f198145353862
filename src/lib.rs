//! Change propagation for project file sync.
//!
//! Producers (file watchers) hand bursts of file changes to a [`ChangeFeed`].
//! A single worker applies them in arrival order:
//! - `store`: current file state per (project, path), soft deletes as tombstones
//! - `runtime`: the queue, the batch processor, per-project sequence numbers
//!   and the append-only change log
//! - `bus`: per-project notification of every logged change
//! - `db`: SQLite persistence with versioned migrations
//! - `config`: environment-driven settings
//!
//! # Usage
//!
//! ```ignore
//! let feed = ChangeFeed::open(&FeedConfig::from_env()?)?;
//! let mut sub = feed.subscribe("project-1");
//! feed.enqueue("project-1", "user-1", vec![FileChange::create("clip.mp4").with_size(10)]);
//! let event = sub.recv().await;
//! ```

pub mod bus;
pub mod config;
pub mod core;
pub mod db;
pub mod runtime;
pub mod store;

#[cfg(test)]
mod testing;

pub use bus::{ChangeEvent, Notifier, Subscription, SubscriptionHandle};
pub use config::{ConfigError, FeedConfig};
pub use crate::core::change::{ChangeBatch, ChangeOp, FileChange};
pub use crate::core::mime::{mime_type_for_path, FALLBACK_MIME_TYPE};
pub use crate::core::record::{FileMetadata, FileRecord, LogEntry, Tombstone};
pub use runtime::{BatchReport, ChangeFeed, EnqueueStatus};
pub use store::{ChangeStore, FileStateStore, SqliteChangeStore, StoreError};

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("{0}")]
    Db(#[from] db::DbError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the global `tracing` subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("changefeed=debug,info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
