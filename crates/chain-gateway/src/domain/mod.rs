//! Domain types for the chain gateway.
//!
//! Chain models, ABI handling, configuration, and error handling. Nothing in
//! here performs I/O except config file loading.

pub mod abi;
pub mod config;
pub mod encoding;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use abi::{AbiFunction, AbiValue, ParamType};
pub use config::{ConfigError, GatewayConfig};
pub use error::{ApiError, ApiResult, ChainError, ChainResult, GatewayError};
pub use types::*;
