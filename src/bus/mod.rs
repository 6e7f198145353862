//! Change notification fan-out.
//!
//! - `Notifier`: per-project broadcast topics, publish never waits on subscribers
//! - `Subscription` / `SubscriptionHandle`: explicit receiver or callback
//!   subscriptions, both released on drop
//!
//! Delivery is at-most-once. Consumers that need every event re-read the
//! change log after the last sequence they saw.

mod event_types;
mod notifier;

pub use event_types::{ChangeEvent, EVENT_FILE_CHANGED};
pub use notifier::{Notifier, Subscription, SubscriptionHandle};
