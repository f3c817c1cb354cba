//! WebSocket push channels.
//!
//! Per-connection polling: each subscriber owns its watcher and cursor; the
//! hub only tracks who is connected.

pub mod handler;
pub mod hub;
pub mod watcher;

pub use handler::{ws_blocks, ws_gas};
pub use hub::{
    HubError, Registration, SubscriberId, SubscriberInfo, SubscriberState, SubscriptionHub, Topic,
};
pub use watcher::{run_subscriber, BlockWatcher, EventSink, GasWatcher, SinkError, WatchContext};
