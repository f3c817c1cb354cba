//! Ports: capabilities the gateway consumes.

pub mod outbound;

pub use outbound::{BlockTag, ChainReader, SystemTimeSource, TimeSource};
