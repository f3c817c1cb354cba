//! Per-subscriber polling loops.
//!
//! Every connection runs its own watcher with its own cursor. A tick whose
//! upstream read fails or exceeds the upstream timeout is logged and skipped;
//! only a failed write to the client or cancellation ends the loop.

use crate::chain::ChainService;
use crate::domain::error::ChainResult;
use crate::domain::types::{GasUpdate, WsEvent};
use crate::middleware::GatewayMetrics;
use crate::ws::hub::{Registration, SubscriberState, Topic};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Destination of pushed events (a socket in production).
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: &WsEvent) -> Result<(), SinkError>;
}

/// Write to a subscriber failed
#[derive(Debug, Clone, thiserror::Error)]
#[error("sink closed: {0}")]
pub struct SinkError(pub String);

/// Emits `new_block` only when the head advances past the cursor.
#[derive(Debug, Default)]
pub struct BlockWatcher {
    last_block: Option<u64>,
}

impl BlockWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_block(&self) -> Option<u64> {
        self.last_block
    }

    pub async fn poll(&mut self, chain: &ChainService) -> ChainResult<Option<WsEvent>> {
        let block = chain.get_latest_block().await?;
        let advanced = self.last_block.map_or(true, |last| block.number > last);
        if !advanced {
            return Ok(None);
        }
        self.last_block = Some(block.number);
        Ok(Some(WsEvent::NewBlock(Box::new(block))))
    }
}

/// Emits `gas_update` on every tick.
#[derive(Debug, Default)]
pub struct GasWatcher;

impl GasWatcher {
    pub async fn poll(&mut self, chain: &ChainService) -> ChainResult<Option<WsEvent>> {
        let price = chain.get_gas_price().await?;
        Ok(Some(WsEvent::GasUpdate(GasUpdate::new(price, chain.now()))))
    }
}

/// Watcher for one topic
#[derive(Debug)]
pub enum Watcher {
    Blocks(BlockWatcher),
    Gas(GasWatcher),
}

impl Watcher {
    pub fn for_topic(topic: Topic) -> Self {
        match topic {
            Topic::Blocks => Watcher::Blocks(BlockWatcher::new()),
            Topic::Gas => Watcher::Gas(GasWatcher),
        }
    }

    pub fn topic(&self) -> Topic {
        match self {
            Watcher::Blocks(_) => Topic::Blocks,
            Watcher::Gas(_) => Topic::Gas,
        }
    }

    pub async fn poll(&mut self, chain: &ChainService) -> ChainResult<Option<WsEvent>> {
        match self {
            Watcher::Blocks(w) => w.poll(chain).await,
            Watcher::Gas(w) => w.poll(chain).await,
        }
    }
}

/// Shared inputs of every subscriber loop
#[derive(Clone)]
pub struct WatchContext {
    pub chain: Arc<ChainService>,
    pub metrics: Arc<GatewayMetrics>,
    pub block_interval: Duration,
    pub gas_interval: Duration,
    pub upstream_timeout: Duration,
}

impl WatchContext {
    pub fn interval_for(&self, topic: Topic) -> Duration {
        match topic {
            Topic::Blocks => self.block_interval,
            Topic::Gas => self.gas_interval,
        }
    }
}

/// Drive one subscriber until `cancel` resolves or a write fails.
///
/// Returns the terminal state: `Disconnected` on cancellation, `Failed` on a
/// sink error.
pub async fn run_subscriber<S, C>(
    ctx: &WatchContext,
    registration: &Registration,
    sink: &mut S,
    cancel: C,
) -> SubscriberState
where
    S: EventSink,
    C: Future<Output = ()>,
{
    let topic = registration.topic();
    let subscriber_id = registration.id();
    let mut watcher = Watcher::for_topic(topic);
    let mut ticker = tokio::time::interval(ctx.interval_for(topic));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(cancel);

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => return SubscriberState::Disconnected,
            _ = ticker.tick() => {}
        }

        // The upstream read is abandoned on cancellation or timeout
        let polled = tokio::select! {
            biased;
            _ = &mut cancel => return SubscriberState::Disconnected,
            polled = tokio::time::timeout(ctx.upstream_timeout, watcher.poll(&ctx.chain)) => polled,
        };

        let event = match polled {
            Ok(Ok(Some(event))) => event,
            Ok(Ok(None)) => continue,
            Ok(Err(e)) => {
                ctx.metrics.record_tick_failure();
                warn!(subscriber_id = %subscriber_id, topic = %topic, error = %e, "Watcher tick failed");
                continue;
            }
            Err(_) => {
                ctx.metrics.record_tick_failure();
                warn!(
                    subscriber_id = %subscriber_id,
                    topic = %topic,
                    timeout_ms = ctx.upstream_timeout.as_millis() as u64,
                    "Watcher tick timed out"
                );
                continue;
            }
        };

        if let Err(e) = sink.send(&event).await {
            debug!(subscriber_id = %subscriber_id, error = %e, "Subscriber write failed");
            return SubscriberState::Failed;
        }

        match &event {
            WsEvent::NewBlock(block) => {
                ctx.metrics.record_block_event();
                registration.record_event(Some(block.number));
            }
            WsEvent::GasUpdate(_) => {
                ctx.metrics.record_gas_event();
                registration.record_event(None);
            }
        }
    }
}
