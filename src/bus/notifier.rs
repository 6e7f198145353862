use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::ChangeEvent;

const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Per-project fan-out of [`ChangeEvent`]s.
///
/// Each project is a topic backed by a broadcast channel. Publishing never
/// waits on subscribers: a subscriber that falls more than the topic capacity
/// behind loses the overflowed events.
pub struct Notifier {
    topics: DashMap<String, broadcast::Sender<ChangeEvent>>,
    capacity: usize,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Deliver `event` to every current subscriber of `project_id`.
    /// Returns how many subscribers it was handed to.
    pub fn publish(&self, project_id: &str, event: ChangeEvent) -> usize {
        let Some(tx) = self.topics.get(project_id).map(|topic| topic.value().clone()) else {
            tracing::trace!(project_id, seq = event.seq, "no subscribers for project");
            return 0;
        };

        match tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                // Every receiver is gone; drop the topic unless someone
                // subscribed in the meantime.
                self.topics
                    .remove_if(project_id, |_, tx| tx.receiver_count() == 0);
                0
            }
        }
    }

    pub fn subscribe(&self, project_id: &str) -> Subscription {
        let rx = self
            .topics
            .entry(project_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Subscription {
            project_id: project_id.to_string(),
            rx,
        }
    }

    /// Run `handler` for each event of `project_id` on a dedicated task.
    /// Must be called from within a tokio runtime.
    pub fn subscribe_with<F>(&self, project_id: &str, handler: F) -> SubscriptionHandle
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let mut subscription = self.subscribe(project_id);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        });
        SubscriptionHandle {
            project_id: project_id.to_string(),
            task: Some(task),
        }
    }

    pub fn subscriber_count(&self, project_id: &str) -> usize {
        self.topics
            .get(project_id)
            .map(|topic| topic.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("topics", &self.topics.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A receiving end for one project's events. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    project_id: String,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Wait for the next event. Returns `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        project_id = %self.project_id,
                        "subscriber lagged, dropped {n} events"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(
                        project_id = %self.project_id,
                        "subscriber lagged, dropped {n} events"
                    );
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

/// Handle for a callback subscription. Unsubscribing (or dropping the
/// handle) stops the callback task; [`SubscriptionHandle::join`] instead lets
/// it run until the notifier is gone.
#[derive(Debug)]
pub struct SubscriptionHandle {
    project_id: String,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn unsubscribe(self) {}

    /// Wait for the callback task to handle every event already published.
    /// Returns once the notifier has been dropped and the backlog is drained.
    pub async fn join(mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            if e.is_panic() {
                tracing::error!(project_id = %self.project_id, "subscriber callback panicked: {e}");
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
