//! Cached chain reads.

pub mod cache;
pub mod service;
pub mod validation;

pub use cache::{BoundedCache, CacheStats};
pub use service::{ChainService, ChainServiceConfig};
