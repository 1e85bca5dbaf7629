//! The broadcast hub: one task owning the observer set.
//!
//! Handles talk to the task over an unbounded command channel, so `register`,
//! `unregister` and `broadcast` never wait on observers. Delivery uses `try_send`; an
//! observer whose queue is full or closed is dropped from the set.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HubSettings;

const TARGET: &str = "sharelist::hub";
const DEFAULT_OBSERVER_QUEUE_CAPACITY: usize = 32;

pub type ObserverId = u64;

/// A pre-encoded list message, shared by every observer it is delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    epoch: u64,
    payload: Arc<str>,
}

impl Snapshot {
    pub fn new(epoch: u64, payload: impl Into<Arc<str>>) -> Self {
        Self {
            epoch,
            payload: payload.into(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    pub observer_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            observer_queue_capacity: DEFAULT_OBSERVER_QUEUE_CAPACITY,
        }
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            observer_queue_capacity: settings.observer_queue_capacity.get(),
        }
    }
}

/// The receiving side handed to one observer.
///
/// `recv` returns `None` once the hub has dropped the observer or shut down.
pub struct Subscription {
    id: ObserverId,
    receiver: mpsc::Receiver<Snapshot>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.receiver.try_recv().ok()
    }
}

enum HubCommand {
    Register {
        id: ObserverId,
        sender: mpsc::Sender<Snapshot>,
    },
    Unregister {
        id: ObserverId,
    },
    Broadcast(Snapshot),
    ObserverCount(oneshot::Sender<usize>),
}

#[derive(Clone)]
pub struct BroadcastHub {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl BroadcastHub {
    /// Start the hub task. It runs until every handle has been dropped.
    pub fn spawn(config: HubConfig) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = HubWorker {
            commands: receiver,
            observers: HashMap::new(),
            latest: None,
        };
        let handle = tokio::spawn(worker.run());

        let hub = Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: config.observer_queue_capacity.max(1),
        };
        (hub, handle)
    }

    /// Add an observer. The latest snapshot, if any, is queued to it first.
    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        // If the hub is gone the sender is dropped here and the subscription ends at once.
        self.send(HubCommand::Register { id, sender });
        Subscription { id, receiver }
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn unregister(&self, id: ObserverId) {
        self.send(HubCommand::Unregister { id });
    }

    pub fn broadcast(&self, snapshot: Snapshot) {
        self.send(HubCommand::Broadcast(snapshot));
    }

    /// Registered observers, counted after every command sent before this call.
    pub async fn observer_count(&self) -> usize {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::ObserverCount(reply));
        response.await.unwrap_or(0)
    }

    fn send(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            debug!(target = TARGET, "hub stopped; command ignored");
        }
    }
}

struct HubWorker {
    commands: mpsc::UnboundedReceiver<HubCommand>,
    observers: HashMap<ObserverId, mpsc::Sender<Snapshot>>,
    latest: Option<Snapshot>,
}

impl HubWorker {
    async fn run(mut self) {
        info!(target = TARGET, "broadcast hub started");
        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register { id, sender } => self.register(id, sender),
                HubCommand::Unregister { id } => self.unregister(id),
                HubCommand::Broadcast(snapshot) => self.broadcast(snapshot),
                HubCommand::ObserverCount(reply) => {
                    let _ = reply.send(self.observers.len());
                }
            }
        }
        info!(
            target = TARGET,
            observers = self.observers.len(),
            "broadcast hub stopped"
        );
    }

    fn register(&mut self, id: ObserverId, sender: mpsc::Sender<Snapshot>) {
        if let Some(latest) = self.latest.as_ref() {
            if sender.try_send(latest.clone()).is_err() {
                debug!(target = TARGET, observer_id = id, "observer gone before registration");
                return;
            }
        }
        self.observers.insert(id, sender);
        gauge!("sharelist_hub_observers").set(self.observers.len() as f64);
        debug!(target = TARGET, observer_id = id, "observer registered");
    }

    fn unregister(&mut self, id: ObserverId) {
        if self.observers.remove(&id).is_some() {
            gauge!("sharelist_hub_observers").set(self.observers.len() as f64);
            debug!(target = TARGET, observer_id = id, "observer unregistered");
        }
    }

    fn broadcast(&mut self, snapshot: Snapshot) {
        counter!("sharelist_hub_broadcast_total").increment(1);
        let epoch = snapshot.epoch();

        self.observers.retain(|id, sender| {
            match sender.try_send(snapshot.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    counter!("sharelist_hub_observer_dropped_total", "reason" => "full")
                        .increment(1);
                    warn!(
                        target = TARGET,
                        observer_id = *id,
                        epoch,
                        "observer queue full; dropping observer"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    counter!("sharelist_hub_observer_dropped_total", "reason" => "closed")
                        .increment(1);
                    debug!(
                        target = TARGET,
                        observer_id = *id,
                        epoch,
                        "observer closed; dropping observer"
                    );
                    false
                }
            }
        });

        gauge!("sharelist_hub_observers").set(self.observers.len() as f64);
        self.latest = Some(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn hub(capacity: usize) -> BroadcastHub {
        BroadcastHub::spawn(HubConfig {
            observer_queue_capacity: capacity,
        })
        .0
    }

    #[tokio::test]
    async fn broadcast_reaches_every_observer_in_order() {
        let hub = hub(8);
        let mut first = hub.register();
        let mut second = hub.register();

        hub.broadcast(Snapshot::new(1, "one"));
        hub.broadcast(Snapshot::new(2, "two"));

        for subscription in [&mut first, &mut second] {
            assert_eq!(subscription.recv().await.expect("first").payload(), "one");
            assert_eq!(subscription.recv().await.expect("second").payload(), "two");
        }
    }

    #[tokio::test]
    async fn new_observer_receives_latest_snapshot() {
        let hub = hub(8);
        hub.broadcast(Snapshot::new(1, "old"));
        hub.broadcast(Snapshot::new(2, "current"));

        let mut late = hub.register();
        let snapshot = late.recv().await.expect("replayed snapshot");
        assert_eq!(snapshot.epoch(), 2);
        assert_eq!(snapshot.payload(), "current");
    }

    #[tokio::test]
    async fn full_observer_is_dropped_without_blocking_others() {
        let hub = hub(1);
        let mut stalled = hub.register();
        let mut healthy = hub.register();

        hub.broadcast(Snapshot::new(1, "one"));
        assert_eq!(healthy.recv().await.expect("one").payload(), "one");
        hub.broadcast(Snapshot::new(2, "two"));

        assert_eq!(hub.observer_count().await, 1);
        assert_eq!(healthy.recv().await.expect("two").payload(), "two");

        // The stalled observer still drains what it had, then sees the end.
        assert_eq!(stalled.recv().await.expect("buffered").payload(), "one");
        assert!(stalled.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_observer_is_removed_on_next_broadcast() {
        let hub = hub(4);
        let gone = hub.register();
        let mut alive = hub.register();
        drop(gone);

        hub.broadcast(Snapshot::new(1, "one"));
        assert_eq!(hub.observer_count().await, 1);
        assert_eq!(alive.recv().await.expect("delivered").payload(), "one");
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = hub(4);
        let subscription = hub.register();
        let id = subscription.id();

        hub.unregister(id);
        hub.unregister(id);
        hub.unregister(9_999);
        assert_eq!(hub.observer_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_with_no_observers_is_a_no_op() {
        let hub = hub(4);
        hub.broadcast(Snapshot::new(1, "nobody listening"));
        assert_eq!(hub.observer_count().await, 0);
    }

    #[tokio::test]
    async fn hub_stops_when_handles_are_dropped() {
        let (hub, handle) = BroadcastHub::spawn(HubConfig::default());
        let mut subscription = hub.register();
        drop(hub);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("hub task exits")
            .expect("hub task did not panic");
        assert!(subscription.recv().await.is_none());
    }
}
