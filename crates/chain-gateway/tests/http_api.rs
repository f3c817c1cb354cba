//! REST surface driven through the full router with a scripted upstream.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chain_gateway::testing::{make_receipt, make_transaction, FixedTimeSource, MockChainReader};
use chain_gateway::{
    build_router, AppState, ChainError, ChainService, ChainServiceConfig, GatewayConfig, U256,
};
use rlp::RlpStream;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const WALLET: &str = "0x8894e0a0c962cb723c1976a4421c95949be2d4e3";
const TOKEN: &str = "0x55d398326f99059ff775485246999027b3197955";

fn app_with(reader: Arc<MockChainReader>, config: GatewayConfig) -> Router {
    let chain = Arc::new(ChainService::with_clock(
        reader,
        Arc::new(FixedTimeSource::at(1_700_000_000)),
        ChainServiceConfig::from(&config),
    ));
    build_router(AppState::with_chain(&config, chain), &config)
}

fn app(reader: Arc<MockChainReader>) -> Router {
    app_with(reader, GatewayConfig::default())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

fn balance_of_abi() -> Value {
    json!([{
        "type": "function",
        "name": "balanceOf",
        "stateMutability": "view",
        "inputs": [{"name": "owner", "type": "address"}],
        "outputs": [{"name": "", "type": "uint256"}]
    }])
}

fn signed_legacy_tx() -> String {
    let mut s = RlpStream::new_list(9);
    s.append(&3u64);
    s.append(&5_000_000_000u64);
    s.append(&21_000u64);
    s.append(&vec![0x11u8; 20]);
    s.append(&1_000_000_000_000_000u64);
    s.append_empty_data();
    s.append(&147u64);
    s.append(&vec![0x22u8; 32]);
    s.append(&vec![0x33u8; 32]);
    format!("0x{}", hex::encode(s.out()))
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(app(Arc::new(MockChainReader::default())), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["timestamp"], "2023-11-14T22:13:20+00:00");
}

#[tokio::test]
async fn test_balance_in_native_units() {
    let reader = Arc::new(MockChainReader::default());
    reader.set_balance(WALLET, U256::from(1_000_000_000_000_000_000u64));

    let uri = format!("/api/accounts/{}/balance", WALLET.to_uppercase().replacen("0X", "0x", 1));
    let (status, body) = get(app(reader), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], WALLET);
    assert_eq!(body["balance_wei"], "1000000000000000000");
    assert_eq!(body["balance_bnb"], 1.0);
}

#[tokio::test]
async fn test_invalid_address_is_bad_request() {
    let (status, body) = get(
        app(Arc::new(MockChainReader::default())),
        "/api/accounts/0x1234/balance",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("invalid address"));
}

#[tokio::test]
async fn test_latest_block() {
    let (status, body) = get(app(Arc::new(MockChainReader::with_head(10))), "/api/blocks/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["number"], 10);
    assert!(body["parentHash"].is_string());
}

#[tokio::test]
async fn test_latest_blocks_newest_first() {
    let (status, body) = get(
        app(Arc::new(MockChainReader::with_head(10))),
        "/api/blocks/latest/3",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let numbers: Vec<u64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["number"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![10, 9, 8]);
}

#[tokio::test]
async fn test_latest_blocks_over_limit() {
    let (status, _) = get(
        app(Arc::new(MockChainReader::with_head(500))),
        "/api/blocks/latest/101",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_latest_blocks_at_limit() {
    let (status, body) = get(
        app(Arc::new(MockChainReader::with_head(500))),
        "/api/blocks/latest/100",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let blocks = body.as_array().unwrap();
    assert_eq!(blocks.len(), 100);
    assert_eq!(blocks[0]["number"], 500);
    assert_eq!(blocks[99]["number"], 401);
}

#[tokio::test]
async fn test_missing_block_is_not_found() {
    let (status, body) = get(app(Arc::new(MockChainReader::with_head(5))), "/api/blocks/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "not found: block 99");
}

#[tokio::test]
async fn test_legacy_error_status_collapses_to_500() {
    let mut config = GatewayConfig::default();
    config.api.legacy_error_status = true;

    let (status, body) = get(
        app_with(Arc::new(MockChainReader::with_head(5)), config),
        "/api/blocks/99",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("block 99"));
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let reader = Arc::new(MockChainReader::with_head(5));
    reader.fail(
        chain_gateway::testing::methods::GAS_PRICE,
        ChainError::upstream("connection refused"),
    );

    let (status, _) = get(app(reader), "/api/stats").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_transaction_and_receipt() {
    let hash = format!("0x{}", "ab".repeat(32));
    let reader = Arc::new(MockChainReader::with_head(5));
    reader.insert_transaction(make_transaction(&hash, U256::from(42u64)));
    reader.insert_receipt(make_receipt(&hash), 2);

    let mut config = GatewayConfig::default();
    config.timeouts.receipt_poll_interval = Duration::from_millis(10);
    let app = app_with(reader.clone(), config);

    let (status, body) = get(app.clone(), &format!("/api/transactions/{hash}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hash"], hash.as_str());
    assert_eq!(body["value"], "42");

    let (status, body) = get(app, &format!("/api/transactions/{hash}/receipt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transactionHash"], hash.as_str());
    assert_eq!(reader.calls(chain_gateway::testing::methods::TRANSACTION_RECEIPT), 3);
}

#[tokio::test]
async fn test_token_balance() {
    let reader = Arc::new(MockChainReader::default());
    let mut word = vec![0u8; 32];
    word[31] = 42;
    reader.set_call_result(TOKEN, Ok(word));

    let (status, body) = get(
        app(reader.clone()),
        &format!("/api/tokens/{TOKEN}/balances/{WALLET}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "42");
    assert_eq!(body["token_address"], TOKEN);

    let calldata = reader.last_call_data().unwrap();
    assert_eq!(&calldata[..4], &[0x70, 0xa0, 0x82, 0x31]);
    assert_eq!(calldata.len(), 36);
}

#[tokio::test]
async fn test_contract_call() {
    let reader = Arc::new(MockChainReader::default());
    let mut word = vec![0u8; 32];
    word[30] = 0x01;
    word[31] = 0x00;
    reader.set_call_result(TOKEN, Ok(word));

    let (status, body) = post_json(
        app(reader),
        "/api/contracts/call",
        json!({
            "contract_address": TOKEN,
            "function_name": "balanceOf",
            "function_args": [WALLET],
            "abi": balance_of_abi(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "256");
    assert_eq!(body["function_name"], "balanceOf");
}

#[tokio::test]
async fn test_contract_call_empty_return_is_contract_error() {
    let (status, _) = post_json(
        app(Arc::new(MockChainReader::default())),
        "/api/contracts/call",
        json!({
            "contract_address": TOKEN,
            "function_name": "balanceOf",
            "function_args": [WALLET],
            "abi": balance_of_abi(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_contract_call_unknown_function() {
    let (status, body) = post_json(
        app(Arc::new(MockChainReader::default())),
        "/api/contracts/call",
        json!({
            "contract_address": TOKEN,
            "function_name": "totalSupply",
            "function_args": [],
            "abi": balance_of_abi(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("ABI mismatch"));
}

#[tokio::test]
async fn test_malformed_body() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/contracts/call")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app(Arc::new(MockChainReader::default())), request).await;
    assert!(status.is_client_error());
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_send_raw_transaction() {
    let reader = Arc::new(MockChainReader::default());
    let (status, body) = post_json(
        app(reader.clone()),
        "/api/transactions/raw",
        json!({ "raw_transaction": signed_legacy_tx() }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tx_hash"], format!("0x{:064x}", 1));
    assert_eq!(reader.sent_transactions().len(), 1);
}

#[tokio::test]
async fn test_send_raw_transaction_rejects_garbage() {
    let reader = Arc::new(MockChainReader::default());
    let (status, _) = post_json(
        app(reader.clone()),
        "/api/transactions/raw",
        json!({ "raw_transaction": "0xdeadbeef" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reader.sent_transactions().is_empty());
}

#[tokio::test]
async fn test_stats() {
    let reader = Arc::new(MockChainReader::with_head(20));
    reader.set_gas_price(U256::from(5_000_000_000u64));

    let (status, body) = get(app(reader), "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["latest_block_number"], 20);
    assert_eq!(body["gas_price_gwei"], 5.0);
    assert_eq!(body["avg_block_time"], 3.0);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_metrics_report_requests_and_caches() {
    let app = app(Arc::new(MockChainReader::with_head(3)));

    let (status, _) = get(app.clone(), "/api/blocks/2").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(app.clone(), "/api/blocks/2").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"]["total"], 2);
    assert_eq!(body["caches"]["blocks"]["hits"], 1);
    assert_eq!(body["caches"]["blocks"]["misses"], 1);
    assert_eq!(body["subscribers"]["active"], 0);
}
