//! Registry of connected WebSocket subscribers.
//!
//! Each connection registers on upgrade and holds a [`Registration`] for its
//! lifetime; dropping it removes the entry, so one connection failing never
//! touches another's. The hub also carries the shutdown signal observed by
//! every subscriber loop.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Subscriber ID (UUID v7, time-ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Push channel a subscriber listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Blocks,
    Gas,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Blocks => f.write_str("blocks"),
            Topic::Gas => f.write_str("gas"),
        }
    }
}

/// Connection lifecycle: `Connecting -> Active -> {Disconnected, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberState {
    Connecting,
    Active,
    /// Client closed or server shut down
    Disconnected,
    /// A write to the client failed
    Failed,
}

impl SubscriberState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubscriberState::Disconnected | SubscriberState::Failed)
    }
}

/// Snapshot of one subscriber
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub topic: Topic,
    pub state: SubscriberState,
    pub connected_at: DateTime<Utc>,
    pub events_sent: u64,
    /// Cursor of the block watcher
    pub last_block: Option<u64>,
}

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("subscriber limit reached ({0})")]
    Full(usize),
    #[error("gateway is shutting down")]
    ShuttingDown,
}

/// Subscriber registry
pub struct SubscriptionHub {
    subscribers: DashMap<SubscriberId, SubscriberInfo>,
    /// Slots reserved, including registrations not yet inserted
    reserved: AtomicUsize,
    max_subscribers: usize,
    shutdown_tx: watch::Sender<bool>,
}

impl SubscriptionHub {
    pub fn new(max_subscribers: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            subscribers: DashMap::new(),
            reserved: AtomicUsize::new(0),
            max_subscribers,
            shutdown_tx,
        }
    }

    /// Register a new subscriber in `Connecting` state.
    pub fn register(self: &Arc<Self>, topic: Topic) -> Result<Registration, HubError> {
        if *self.shutdown_tx.borrow() {
            return Err(HubError::ShuttingDown);
        }

        let max = self.max_subscribers;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| HubError::Full(max))?;

        let id = SubscriberId::new();
        self.subscribers.insert(
            id,
            SubscriberInfo {
                id,
                topic,
                state: SubscriberState::Connecting,
                connected_at: Utc::now(),
                events_sent: 0,
                last_block: None,
            },
        );
        debug!(subscriber_id = %id, topic = %topic, "Registered subscriber");

        Ok(Registration {
            hub: Arc::clone(self),
            id,
            topic,
            outcome: SubscriberState::Disconnected,
        })
    }

    fn set_state(&self, id: &SubscriberId, state: SubscriberState) {
        if let Some(mut entry) = self.subscribers.get_mut(id) {
            entry.state = state;
        }
    }

    fn record_event(&self, id: &SubscriberId, block_number: Option<u64>) {
        if let Some(mut entry) = self.subscribers.get_mut(id) {
            entry.events_sent += 1;
            if block_number.is_some() {
                entry.last_block = block_number;
            }
        }
    }

    fn deregister(&self, id: &SubscriberId, outcome: SubscriberState) {
        if let Some((_, info)) = self.subscribers.remove(id) {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
            debug!(
                subscriber_id = %id,
                topic = %info.topic,
                outcome = ?outcome,
                events_sent = info.events_sent,
                "Deregistered subscriber"
            );
        }
    }

    /// Number of registered subscribers.
    pub fn active_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of registered subscribers on `topic`.
    pub fn count_for(&self, topic: Topic) -> usize {
        self.subscribers
            .iter()
            .filter(|entry| entry.topic == topic)
            .count()
    }

    pub fn get(&self, id: &SubscriberId) -> Option<SubscriberInfo> {
        self.subscribers.get(id).map(|entry| entry.clone())
    }

    pub fn state(&self, id: &SubscriberId) -> Option<SubscriberState> {
        self.subscribers.get(id).map(|entry| entry.state)
    }

    pub fn snapshot(&self) -> Vec<SubscriberInfo> {
        self.subscribers.iter().map(|entry| entry.clone()).collect()
    }

    pub fn max_subscribers(&self) -> usize {
        self.max_subscribers
    }

    /// Signal every subscriber loop to stop.
    pub fn shutdown(&self) {
        info!(active = self.active_count(), "Stopping WebSocket subscribers");
        self.shutdown_tx.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.shutdown_tx.subscribe())
    }
}

/// Resolves once the hub is shut down
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    pub async fn wait(&mut self) {
        // A dropped hub counts as shutdown
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

/// A subscriber's hold on its registry entry; deregisters on drop.
pub struct Registration {
    hub: Arc<SubscriptionHub>,
    id: SubscriberId,
    topic: Topic,
    outcome: SubscriberState,
}

impl Registration {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// `Connecting -> Active` after a successful handshake.
    pub fn activate(&self) {
        self.hub.set_state(&self.id, SubscriberState::Active);
    }

    /// Note a delivered event and advance the block cursor.
    pub fn record_event(&self, block_number: Option<u64>) {
        self.hub.record_event(&self.id, block_number);
    }

    /// Deregister with a terminal state.
    pub fn finish(mut self, outcome: SubscriberState) {
        self.outcome = outcome;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.set_state(&self.id, self.outcome);
        self.hub.deregister(&self.id, self.outcome);
    }
}
