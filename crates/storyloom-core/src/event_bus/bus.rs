use super::types::PipelineEvent;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use storyloom_replay::{Step, StepKind, StepObserver};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle for a callback subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

fn slot(kind: StepKind) -> usize {
    match kind {
        StepKind::Context => 0,
        StepKind::Prompt => 1,
        StepKind::Query => 2,
        StepKind::Response => 3,
        StepKind::Generation => 4,
        StepKind::Persisted => 5,
    }
}

/// Broadcast-based event bus for live pipeline events.
///
/// Each step kind has its own channel; a separate lifecycle channel carries
/// every event including steps. Slow subscribers miss events (lagged)
/// rather than blocking the pipeline.
#[derive(Debug)]
pub struct EventBus {
    steps: [broadcast::Sender<Step>; 6],
    events: broadcast::Sender<PipelineEvent>,
    subscriptions: DashMap<SubscriptionId, JoinHandle<()>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new EventBus with the given per-channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (events, _) = broadcast::channel(capacity);
        Self {
            steps: std::array::from_fn(|_| broadcast::channel(capacity).0),
            events,
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Receive every future step of one kind, in sequence order.
    #[must_use]
    pub fn subscribe(&self, kind: StepKind) -> broadcast::Receiver<Step> {
        self.steps[slot(kind)].subscribe()
    }

    /// Receive every future event, lifecycle and steps alike.
    #[must_use]
    pub fn subscribe_all(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Publish an event to all active subscribers.
    ///
    /// Returns the number of receivers that got it. With no subscribers the
    /// event is dropped.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        let mut delivered = 0;
        if let PipelineEvent::StepRecorded { step } = &event {
            delivered += self.steps[slot(step.kind)].send(step.clone()).unwrap_or(0);
        }
        delivered + self.events.send(event).unwrap_or(0)
    }

    /// Publish a recorded step
    pub fn publish_step(&self, step: Step) -> usize {
        self.publish(PipelineEvent::StepRecorded { step })
    }

    /// Run `callback` on its own task for every step of `kind`.
    ///
    /// Errors and panics in the callback are logged and the subscription
    /// keeps running. Must be called from within a tokio runtime.
    pub fn on<F>(&self, kind: StepKind, callback: F) -> SubscriptionId
    where
        F: Fn(&Step) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.spawn_listener(self.subscribe(kind), callback)
    }

    /// Run `callback` on its own task for every event.
    pub fn on_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.spawn_listener(self.subscribe_all(), callback)
    }

    fn spawn_listener<T, F>(&self, mut rx: broadcast::Receiver<T>, callback: F) -> SubscriptionId
    where
        T: Clone + Send + 'static,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(item) => match std::panic::catch_unwind(AssertUnwindSafe(|| callback(&item)))
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(subscription = %id, error = %e, "Subscriber callback failed")
                        }
                        Err(_) => warn!(subscription = %id, "Subscriber callback panicked"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(subscription = %id, skipped, "Subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(subscription = %id, "Subscription closed");
        });

        self.subscriptions.insert(id, handle);
        id
    }

    /// Stop a callback subscription. Returns false if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.subscriptions.remove(&id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Number of active callback subscriptions
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of live receivers across all channels
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
            + self
                .steps
                .iter()
                .map(broadcast::Sender::receiver_count)
                .sum::<usize>()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().abort();
        }
    }
}

impl StepObserver for EventBus {
    fn on_step(&self, step: &Step) {
        self.publish_step(step.clone());
    }
}
