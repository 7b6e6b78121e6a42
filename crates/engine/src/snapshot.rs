//! Snapshot assembly and fan-out.
//!
//! [`SnapshotBuilder`] reads engine state into an immutable [`Snapshot`];
//! [`SubscriptionBroadcaster`] pushes it to trait subscribers and to a
//! `tokio::sync::broadcast` channel. Each snapshot is a full-state
//! replacement, so receivers never need ordering guarantees.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use tabhive_core::snapshot::{Snapshot, SnapshotSubscriber};

use crate::history::HistoryCache;
use crate::registry::AgentRegistry;
use crate::runtime_context::RuntimeContextStore;

/// Default number of history records included in a snapshot.
pub const DEFAULT_HISTORY_LIMIT: usize = 60;

/// Builds snapshots from engine state.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    history_limit: usize,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SnapshotBuilder {
    pub fn new(history_limit: usize) -> Self {
        Self { history_limit }
    }

    pub fn build(
        &self,
        reason: &str,
        registry: &AgentRegistry,
        history: &HistoryCache,
        runtime: &RuntimeContextStore,
        now: i64,
    ) -> Snapshot {
        Snapshot {
            reason: reason.to_string(),
            active_agent_id: registry.active_agent_id().cloned(),
            history: history.recent(self.history_limit),
            runtime_context: runtime.current().map(|ctx| (*ctx).clone()),
            agents: registry.list(),
            updated_at: now,
        }
    }
}

/// Outcome of one fan-out. Broadcasting never fails as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans snapshots out to every subscriber.
pub struct SubscriptionBroadcaster {
    subscribers: RwLock<Vec<Arc<dyn SnapshotSubscriber>>>,
    sender: broadcast::Sender<Arc<Snapshot>>,
}

impl std::fmt::Debug for SubscriptionBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBroadcaster")
            .field("subscribers", &self.subscribers.read().len())
            .field("channel_receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl Default for SubscriptionBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SubscriptionBroadcaster {
    /// Create a broadcaster whose channel buffers `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            subscribers: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Register a push subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn SnapshotSubscriber>) {
        tracing::debug!(subscriber = subscriber.name(), "Snapshot subscriber registered");
        self.subscribers.write().push(subscriber);
    }

    /// Remove every subscriber registered under `name`.
    pub fn unsubscribe(&self, name: &str) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.name() != name);
        subscribers.len() != before
    }

    /// A channel receiver that sees every subsequent snapshot.
    ///
    /// Slow receivers lag and skip ahead; that is fine because each snapshot
    /// supersedes the previous one.
    pub fn channel(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len() + self.sender.receiver_count()
    }

    /// Deliver a snapshot to everyone. Failures are counted and logged.
    pub fn broadcast(&self, snapshot: Arc<Snapshot>) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers {
            match subscriber.on_snapshot(Arc::clone(&snapshot)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!(
                        subscriber = subscriber.name(),
                        reason = %snapshot.reason,
                        error = %e,
                        "Snapshot delivery failed"
                    );
                    report.failed += 1;
                }
            }
        }

        // No channel receivers is not a failure
        if let Ok(receivers) = self.sender.send(snapshot) {
            report.delivered += receivers;
        }

        report
    }
}
