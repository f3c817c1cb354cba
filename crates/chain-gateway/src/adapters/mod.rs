//! Adapters for the chain gateway.
//!
//! Infrastructure implementations of the outbound ports.

pub mod error_conversions;
pub mod json_rpc;

pub use json_rpc::JsonRpcReader;
