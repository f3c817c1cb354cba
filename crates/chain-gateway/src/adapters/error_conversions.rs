//! Error conversions from infrastructure types.
//!
//! These conversions involve HTTP client types and belong in the adapters layer.

use crate::domain::ChainError;

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChainError::upstream("upstream request timed out")
        } else if e.is_connect() {
            ChainError::upstream(format!("cannot reach upstream node: {e}"))
        } else if e.is_decode() {
            ChainError::upstream(format!("malformed upstream response: {e}"))
        } else {
            ChainError::upstream(e.to_string())
        }
    }
}
