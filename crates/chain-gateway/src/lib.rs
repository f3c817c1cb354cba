//! Chain Gateway - cached HTTP reads and WebSocket push updates over a single
//! EVM-compatible JSON-RPC node.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        CHAIN GATEWAY                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │   REST  /api/*  /health  /metrics      WebSocket  /ws/*       │
//! │         │                                   │                 │
//! │  ┌──────┴───────────────────────┐   ┌──────┴──────────────┐  │
//! │  │ Middleware                   │   │ SubscriptionHub     │  │
//! │  │ Cors → Tracing → Metrics →   │   │ per-connection      │  │
//! │  │ Timeout                      │   │ block / gas watcher │  │
//! │  └──────┬───────────────────────┘   └──────┬──────────────┘  │
//! │         └──────────────┬────────────────────┘                 │
//! │               ┌────────┴─────────┐                            │
//! │               │  ChainService    │  block + tx LRU caches     │
//! │               └────────┬─────────┘                            │
//! │               ┌────────┴─────────┐                            │
//! │               │  ChainReader     │  (JsonRpcReader)           │
//! │               └────────┬─────────┘                            │
//! └────────────────────────┼─────────────────────────────────────┘
//!                          ▼
//!                   upstream JSON-RPC node
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chain_gateway::{GatewayConfig, GatewayService};
//!
//! let service = GatewayService::new(GatewayConfig::default()).await?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod chain;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod router;
pub mod service;
pub mod testing;
pub mod ws;

// Re-exports for public API
pub use adapters::JsonRpcReader;
pub use chain::{ChainService, ChainServiceConfig};
pub use domain::config::GatewayConfig;
pub use domain::error::{ApiError, ApiResult, ChainError, ChainResult, GatewayError};
pub use domain::types::*;
pub use middleware::GatewayMetrics;
pub use ports::{ChainReader, TimeSource};
pub use router::{build_router, AppState};
pub use service::GatewayService;
pub use ws::{SubscriberState, SubscriptionHub, Topic};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
