//! Fan-out implementation.

use agentmesh_core::{DirectoryEvent, EventFeedConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Identifier assigned to each subscription.
pub type SubscriberId = u64;

enum FeedCommand {
    Publish(DirectoryEvent),
    Subscribe(Subscriber),
}

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<DirectoryEvent>,
    overflowed: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    overflowed: AtomicU64,
    subscribers: AtomicUsize,
}

/// Point-in-time feed counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedStats {
    pub published: u64,
    pub delivered: u64,
    /// Subscribers disconnected because their queue was full
    pub overflowed: u64,
    /// Live subscribers as last seen by the fan-out task
    pub subscribers: usize,
}

/// Handle to the directory event feed.
///
/// Cheap to clone. The fan-out task stops once every clone is dropped, which
/// in turn closes every subscription.
#[derive(Clone)]
pub struct EventFeed {
    ingress: mpsc::UnboundedSender<FeedCommand>,
    capacity: usize,
    next_id: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for EventFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFeed")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

impl EventFeed {
    /// Create a feed and spawn its fan-out task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &EventFeedConfig) -> Self {
        Self::with_capacity(config.subscriber_capacity)
    }

    /// Create a feed whose subscribers get queues of `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (ingress, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        tokio::spawn(run_fan_out(rx, Arc::clone(&counters)));
        Self {
            ingress,
            capacity: capacity.max(1),
            next_id: Arc::new(AtomicU64::new(1)),
            counters,
        }
    }

    /// Queue an event for every current subscriber. Never blocks.
    pub fn publish(&self, event: DirectoryEvent) {
        let event_type = event.event_type();
        if self.ingress.send(FeedCommand::Publish(event)).is_err() {
            debug!(event_type, "Event feed stopped, dropping event");
        }
    }

    /// Subscribe with the feed's default queue capacity.
    pub fn subscribe(&self) -> EventSubscription {
        self.subscribe_with_capacity(self.capacity)
    }

    /// Subscribe with a specific queue capacity.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> EventSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let overflowed = Arc::new(AtomicBool::new(false));
        let subscriber = Subscriber {
            id,
            tx,
            overflowed: Arc::clone(&overflowed),
        };
        if self.ingress.send(FeedCommand::Subscribe(subscriber)).is_err() {
            debug!(subscriber_id = id, "Event feed stopped, subscription will be empty");
        }
        EventSubscription { id, rx, overflowed }
    }

    /// Invoke `handler` for every event on a dedicated task.
    ///
    /// The task ends when the feed stops or the subscription overflows.
    pub fn subscribe_fn<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(DirectoryEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        })
    }

    /// False once the fan-out task is gone, for instance because the runtime
    /// that spawned it shut down. Published events are dropped from then on.
    pub fn is_running(&self) -> bool {
        !self.ingress.is_closed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.counters.subscribers.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            overflowed: self.counters.overflowed.load(Ordering::Relaxed),
            subscribers: self.counters.subscribers.load(Ordering::Relaxed),
        }
    }
}

async fn run_fan_out(mut ingress: mpsc::UnboundedReceiver<FeedCommand>, counters: Arc<Counters>) {
    let mut subscribers: Vec<Subscriber> = Vec::new();

    while let Some(command) = ingress.recv().await {
        match command {
            FeedCommand::Subscribe(subscriber) => {
                debug!(subscriber_id = subscriber.id, "Subscriber attached");
                subscribers.push(subscriber);
            }
            FeedCommand::Publish(event) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
                subscribers.retain(|subscriber| match subscriber.tx.try_send(event.clone()) {
                    Ok(()) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(TrySendError::Full(_)) => {
                        subscriber.overflowed.store(true, Ordering::Release);
                        counters.overflowed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            subscriber_id = subscriber.id,
                            event_type = event.event_type(),
                            agent_id = %event.agent_id(),
                            "Subscriber queue full, disconnecting subscriber"
                        );
                        false
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscriber_id = subscriber.id, "Subscriber detached");
                        false
                    }
                });
            }
        }
        counters
            .subscribers
            .store(subscribers.len(), Ordering::Relaxed);
    }

    debug!("Event feed ingress closed, fan-out task exiting");
}

/// Receiving side of one subscription.
///
/// Dropping it detaches the subscriber on the next published event.
#[derive(Debug)]
pub struct EventSubscription {
    id: SubscriberId,
    rx: mpsc::Receiver<DirectoryEvent>,
    overflowed: Arc<AtomicBool>,
}

impl EventSubscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the feed stopped or this subscriber was
    /// disconnected and its queue is drained.
    pub async fn recv(&mut self) -> Option<DirectoryEvent> {
        self.rx.recv().await
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<DirectoryEvent> {
        self.rx.try_recv().ok()
    }

    /// True if the feed disconnected this subscriber for falling behind.
    pub fn was_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }
}
