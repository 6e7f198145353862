//! Change application pipeline.
//!
//! # Sub-modules
//!
//! - `queue`: bounded FIFO drained by a single worker task
//! - `processor`: per-change application with error isolation
//! - `sequence` / `event_log`: per-project sequence numbers and the append-only log
//! - `feed`: wiring of the above into one handle

mod event_log;
mod feed;
mod processor;
mod queue;
mod sequence;

#[cfg(test)]
mod tests;

pub use event_log::EventLog;
pub use feed::ChangeFeed;
pub use processor::{BatchProcessor, BatchReport};
pub use queue::{ChangeQueue, EnqueueStatus, DEFAULT_QUEUE_CAPACITY};
pub use sequence::SequenceAssigner;
