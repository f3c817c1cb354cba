//! HTTP middleware for the chain gateway.
//!
//! Layer order (outermost first): Cors → Tracing → Metrics → Timeout → Handler

pub mod cors;
pub mod metrics;
pub mod timeout;
pub mod tracing;

pub use cors::create_cors_layer;
pub use metrics::{GatewayMetrics, MetricsLayer, RequestTimer};
pub use timeout::{TimeoutLayer, TimeoutPolicy};
pub use tracing::TracingLayer;
