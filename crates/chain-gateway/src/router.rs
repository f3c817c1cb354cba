//! REST route table and handlers.
//!
//! Handlers are thin: parse path/body, call [`ChainService`], stamp the
//! observation time, and map failures through [`AppState::reject`].

use crate::chain::service::{ChainService, ChainServiceConfig};
use crate::domain::config::GatewayConfig;
use crate::domain::error::{ApiError, ApiResult, ChainError};
use crate::domain::types::{
    parse_address, AccountBalance, Block, ContractCallRequest, ContractCallResult,
    HealthResponse, RawTransactionRequest, RawTransactionResult, StatsResponse, TokenBalance,
    Transaction, TransactionReceipt,
};
use crate::middleware::{
    create_cors_layer, GatewayMetrics, MetricsLayer, TimeoutLayer, TimeoutPolicy, TracingLayer,
};
use crate::ports::outbound::ChainReader;
use crate::ws::handler::{ws_blocks, ws_gas};
use crate::ws::hub::{SubscriptionHub, Topic};
use crate::ws::watcher::WatchContext;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::warn;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<ChainService>,
    pub hub: Arc<SubscriptionHub>,
    pub metrics: Arc<GatewayMetrics>,
    pub watch: WatchContext,
    /// Collapse every failure into HTTP 500
    pub legacy_error_status: bool,
}

impl AppState {
    /// Build the state over `reader` with the system clock.
    pub fn new(config: &GatewayConfig, reader: Arc<dyn ChainReader>) -> Self {
        let chain = Arc::new(ChainService::new(
            reader,
            ChainServiceConfig::from(config),
        ));
        Self::with_chain(config, chain)
    }

    /// Build the state around an existing service.
    pub fn with_chain(config: &GatewayConfig, chain: Arc<ChainService>) -> Self {
        let metrics = Arc::new(GatewayMetrics::new());
        let watch = WatchContext {
            chain: Arc::clone(&chain),
            metrics: Arc::clone(&metrics),
            block_interval: config.subscriptions.block_interval,
            gas_interval: config.subscriptions.gas_interval,
            upstream_timeout: config.subscriptions.upstream_timeout,
        };

        Self {
            chain,
            hub: Arc::new(SubscriptionHub::new(config.subscriptions.max_subscribers)),
            metrics,
            watch,
            legacy_error_status: config.api.legacy_error_status,
        }
    }

    /// Map a chain failure to the configured HTTP error.
    pub fn reject(&self, err: ChainError) -> ApiError {
        warn!(kind = err.kind(), error = %err, "Request failed");
        if self.legacy_error_status {
            ApiError::collapsed(&err)
        } else {
            ApiError::from_chain(&err)
        }
    }

    fn timestamp(&self) -> String {
        self.chain.now().to_rfc3339()
    }
}

/// Build the full HTTP router with middleware.
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    let timeouts = TimeoutPolicy {
        default: config.timeouts.request,
        // Receipt lookups may wait the full inclusion window plus one upstream call
        receipt: config.timeouts.receipt_wait + config.timeouts.rpc,
    };

    // Outermost first
    let middleware = ServiceBuilder::new()
        .layer(create_cors_layer(&config.cors))
        .layer(TracingLayer::new())
        .layer(MetricsLayer::new(Arc::clone(&state.metrics)))
        .layer(TimeoutLayer::new(timeouts));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/blocks/latest", get(latest_block))
        .route("/api/blocks/latest/:count", get(latest_blocks))
        .route("/api/blocks/:block_number", get(block_by_number))
        .route("/api/transactions/raw", post(send_raw_transaction))
        .route("/api/transactions/:tx_hash", get(transaction))
        .route("/api/transactions/:tx_hash/receipt", get(transaction_receipt))
        .route("/api/accounts/:address/balance", get(account_balance))
        .route(
            "/api/tokens/:token_address/balances/:wallet_address",
            get(token_balance),
        )
        .route("/api/contracts/call", post(call_contract))
        .route("/api/stats", get(stats))
        .route("/ws/blocks", get(ws_blocks))
        .route("/ws/gas", get(ws_gas))
        .layer(middleware)
        .with_state(state)
}

/// Request bodies that fail to parse are reported like other input errors.
fn body_error(rejection: JsonRejection) -> ApiError {
    ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
}

fn parse_path_number(raw: &str, what: &str) -> Result<u64, ChainError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ChainError::InvalidInput(format!("{what} must be a non-negative integer: {raw}")))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: state.timestamp(),
    })
}

async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut body = state.metrics.to_json();
    body["caches"] = serde_json::json!({
        "blocks": state.chain.block_cache_stats(),
        "transactions": state.chain.transaction_cache_stats(),
    });
    body["subscribers"] = serde_json::json!({
        "active": state.hub.active_count(),
        "blocks": state.hub.count_for(Topic::Blocks),
        "gas": state.hub.count_for(Topic::Gas),
        "max": state.hub.max_subscribers(),
    });
    Json(body)
}

async fn latest_block(State(state): State<AppState>) -> ApiResult<Json<Block>> {
    state
        .chain
        .get_latest_block()
        .await
        .map(Json)
        .map_err(|e| state.reject(e))
}

async fn latest_blocks(
    State(state): State<AppState>,
    Path(count): Path<String>,
) -> ApiResult<Json<Vec<Block>>> {
    let count = parse_path_number(&count, "count").map_err(|e| state.reject(e))?;
    state
        .chain
        .get_latest_blocks(count)
        .await
        .map(Json)
        .map_err(|e| state.reject(e))
}

async fn block_by_number(
    State(state): State<AppState>,
    Path(block_number): Path<String>,
) -> ApiResult<Json<Block>> {
    let number = parse_path_number(&block_number, "block_number").map_err(|e| state.reject(e))?;
    state
        .chain
        .get_block(number)
        .await
        .map(Json)
        .map_err(|e| state.reject(e))
}

async fn transaction(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> ApiResult<Json<Transaction>> {
    state
        .chain
        .get_transaction(&tx_hash)
        .await
        .map(Json)
        .map_err(|e| state.reject(e))
}

async fn transaction_receipt(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> ApiResult<Json<TransactionReceipt>> {
    state
        .chain
        .get_transaction_receipt(&tx_hash)
        .await
        .map(Json)
        .map_err(|e| state.reject(e))
}

async fn account_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<AccountBalance>> {
    let address = parse_address(&address).map_err(|e| state.reject(e))?;
    let balance_wei = state
        .chain
        .get_balance(&address)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(AccountBalance {
        address,
        balance_native: balance_wei.to_native(),
        balance_wei,
        timestamp: state.timestamp(),
    }))
}

async fn token_balance(
    State(state): State<AppState>,
    Path((token_address, wallet_address)): Path<(String, String)>,
) -> ApiResult<Json<TokenBalance>> {
    let token_address = parse_address(&token_address).map_err(|e| state.reject(e))?;
    let wallet_address = parse_address(&wallet_address).map_err(|e| state.reject(e))?;
    let balance = state
        .chain
        .get_token_balance(&token_address, &wallet_address)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(TokenBalance {
        token_address,
        wallet_address,
        balance,
        timestamp: state.timestamp(),
    }))
}

async fn call_contract(
    State(state): State<AppState>,
    body: Result<Json<ContractCallRequest>, JsonRejection>,
) -> ApiResult<Json<ContractCallResult>> {
    let Json(request) = body.map_err(body_error)?;
    let result = state
        .chain
        .call_contract(
            &request.contract_address,
            &request.abi,
            &request.function_name,
            &request.function_args,
        )
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(ContractCallResult {
        contract_address: request.contract_address,
        function_name: request.function_name,
        result,
        timestamp: state.timestamp(),
    }))
}

async fn send_raw_transaction(
    State(state): State<AppState>,
    body: Result<Json<RawTransactionRequest>, JsonRejection>,
) -> ApiResult<Json<RawTransactionResult>> {
    let Json(request) = body.map_err(body_error)?;
    let tx_hash = state
        .chain
        .send_raw_transaction(&request.raw_transaction)
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(RawTransactionResult {
        tx_hash,
        timestamp: state.timestamp(),
    }))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state.chain.get_stats().await.map_err(|e| state.reject(e))?;
    Ok(Json(StatsResponse {
        stats,
        timestamp: state.timestamp(),
    }))
}
