//! Gateway error types.
//!
//! `ChainError` is the typed failure surfaced by the read path; `ApiError` is
//! the HTTP envelope it collapses into at the gateway boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy of the chain read path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Upstream node unreachable, misbehaving, or the call timed out in transit
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Block or transaction absent on chain
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed address input
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed non-address input (hash, raw transaction, count)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Contract reverted or returned nothing where outputs were declared
    #[error("contract error: {0}")]
    Contract(String),

    /// Caller-supplied ABI does not match the function or arguments
    #[error("ABI mismatch: {0}")]
    AbiMismatch(String),

    /// Waited for a condition (receipt inclusion) that never arrived
    #[error("timeout: {0}")]
    Timeout(String),
}

impl ChainError {
    /// HTTP status for this failure.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ChainError::NotFound(_) => StatusCode::NOT_FOUND,
            ChainError::InvalidAddress(_)
            | ChainError::InvalidInput(_)
            | ChainError::AbiMismatch(_) => StatusCode::BAD_REQUEST,
            ChainError::Contract(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ChainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ChainError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::Upstream(_) => "upstream",
            ChainError::NotFound(_) => "not_found",
            ChainError::InvalidAddress(_) => "invalid_address",
            ChainError::InvalidInput(_) => "invalid_input",
            ChainError::Contract(_) => "contract",
            ChainError::AbiMismatch(_) => "abi_mismatch",
            ChainError::Timeout(_) => "timeout",
        }
    }

    pub fn upstream(details: impl Into<String>) -> Self {
        ChainError::Upstream(details.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ChainError::NotFound(resource.into())
    }
}

/// Result type for chain read operations
pub type ChainResult<T> = Result<T, ChainError>;

/// HTTP error envelope, serialised as `{"detail": "..."}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: StatusCode,
    /// Error message
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Map a chain error to its differentiated HTTP status.
    pub fn from_chain(err: &ChainError) -> Self {
        Self::new(err.http_status(), err.to_string())
    }

    /// Map a chain error to a generic 500, as older clients expect.
    pub fn collapsed(err: &ChainError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }

    pub fn bad_request(details: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, details)
    }

    pub fn unavailable(details: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, details)
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            format!("Request timeout: {}", operation.into()),
        )
    }

    /// JSON body of the error
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            detail: self.message.clone(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::from_chain(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

/// Wire shape of an error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Result type for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Gateway-level errors (server lifecycle, not request handling)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// I/O error while serving
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
