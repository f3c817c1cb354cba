//! Whole-request timeout for REST handlers.
//!
//! Receipt lookups wait for inclusion and get their own, longer budget.

use crate::domain::error::ApiError;
use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower::{Layer, Service};
use tracing::warn;

/// Per-route timeout budget
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// Applies to every route without a specific budget
    pub default: Duration,
    /// Applies to `.../receipt`
    pub receipt: Duration,
}

impl TimeoutPolicy {
    pub fn timeout_for(&self, path: &str) -> Duration {
        if path.ends_with("/receipt") {
            self.receipt
        } else {
            self.default
        }
    }
}

/// Timeout layer
#[derive(Clone)]
pub struct TimeoutLayer {
    policy: Arc<TimeoutPolicy>,
}

impl TimeoutLayer {
    pub fn new(policy: TimeoutPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            policy: Arc::clone(&self.policy),
        }
    }
}

/// Timeout service
#[derive(Clone)]
pub struct TimeoutService<S> {
    inner: S,
    policy: Arc<TimeoutPolicy>,
}

impl<S> Service<Request<Body>> for TimeoutService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let budget = self.policy.timeout_for(req.uri().path());
        let path = req.uri().path().to_string();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match timeout(budget, inner.call(req)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(path = %path, timeout_ms = budget.as_millis() as u64, "Request timed out");
                    Ok(ApiError::timeout(format!("exceeded {}s", budget.as_secs())).into_response())
                }
            }
        })
    }
}
