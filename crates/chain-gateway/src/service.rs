//! Gateway service - wires configuration, upstream reader, router and the
//! HTTP server lifecycle.

use crate::adapters::json_rpc::JsonRpcReader;
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::middleware::GatewayMetrics;
use crate::ports::outbound::ChainReader;
use crate::router::{build_router, AppState};
use crate::ws::hub::SubscriptionHub;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Chain gateway service
pub struct GatewayService {
    config: GatewayConfig,
    state: AppState,
}

impl GatewayService {
    /// Create the service against the configured JSON-RPC endpoint.
    ///
    /// Fails when the node is not on `chain.chain_id`.
    pub async fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let reader = JsonRpcReader::new(config.chain.rpc_url.clone(), config.timeouts.rpc)
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        info!(
            rpc_url = %reader.rpc_url(),
            chain_id = config.chain.chain_id,
            network = %config.chain.network_name,
            "Using upstream node"
        );

        let service = Self::with_reader(config, Arc::new(reader))?;
        service.verify_chain_id().await?;
        Ok(service)
    }

    /// Create the service over any [`ChainReader`].
    pub fn with_reader(
        config: GatewayConfig,
        reader: Arc<dyn ChainReader>,
    ) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        let state = AppState::new(&config, reader);
        Ok(Self { config, state })
    }

    /// Check the upstream node's chain id against `chain.chain_id`.
    pub async fn verify_chain_id(&self) -> Result<(), GatewayError> {
        let expected = self.config.chain.chain_id;
        let reported = self
            .state
            .chain
            .chain_id()
            .await
            .map_err(|e| GatewayError::Config(format!("cannot read upstream chain id: {e}")))?;

        if reported != expected {
            return Err(GatewayError::Config(format!(
                "upstream node is on chain {reported}, expected {expected}"
            )));
        }
        info!(chain_id = reported, "Upstream chain id verified");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.state.metrics)
    }

    pub fn hub(&self) -> Arc<SubscriptionHub> {
        Arc::clone(&self.state.hub)
    }

    /// Router with all routes and middleware installed.
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Bind the configured address and serve until Ctrl-C or [`shutdown`].
    ///
    /// [`shutdown`]: GatewayService::shutdown
    pub async fn start(&self) -> Result<(), GatewayError> {
        if !self.config.http.enabled {
            warn!("HTTP server disabled, nothing to serve");
            return Ok(());
        }

        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let local_addr: SocketAddr = listener.local_addr()?;
        info!(addr = %local_addr, "Chain gateway listening");

        let hub = Arc::clone(&self.state.hub);
        let mut stopped = hub.shutdown_signal();
        let shutdown = async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    info!("Received Ctrl-C");
                    hub.shutdown();
                }
                _ = stopped.wait() => {
                    info!("Received shutdown signal");
                }
            }
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Chain gateway stopped");
        Ok(())
    }

    /// Trigger graceful shutdown; WebSocket subscribers are cancelled.
    pub fn shutdown(&self) {
        self.state.hub.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainReader;
    use std::time::Duration;

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = GatewayConfig::default();
        config.chain.rpc_url = "ws://localhost:8546".to_string();
        let result = GatewayService::with_reader(config, Arc::new(MockChainReader::default()));
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_chain_id_mismatch_rejected() {
        let reader = Arc::new(MockChainReader::with_head(1));
        reader.set_chain_id(97);
        let service = GatewayService::with_reader(GatewayConfig::default(), reader).unwrap();

        let err = service.verify_chain_id().await.unwrap_err();
        assert!(matches!(err, GatewayError::Config(ref msg) if msg.contains("97")));
    }

    #[tokio::test]
    async fn test_chain_id_match_accepted() {
        let mut config = GatewayConfig::default();
        config.chain.chain_id = 97;
        let reader = Arc::new(MockChainReader::with_head(1));
        reader.set_chain_id(97);

        let service = GatewayService::with_reader(config, reader).unwrap();
        assert!(service.verify_chain_id().await.is_ok());
    }

    #[tokio::test]
    async fn test_chain_id_unreadable_rejected() {
        let reader = Arc::new(MockChainReader::with_head(1));
        reader.fail(
            crate::testing::methods::CHAIN_ID,
            crate::domain::error::ChainError::upstream("connection refused"),
        );
        let service = GatewayService::with_reader(GatewayConfig::default(), reader).unwrap();

        assert!(matches!(
            service.verify_chain_id().await,
            Err(GatewayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let service = Arc::new(
            GatewayService::with_reader(
                GatewayConfig::default(),
                Arc::new(MockChainReader::with_head(5)),
            )
            .unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let server = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.serve(listener).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        service.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
