//! `ChainReader` over HTTP JSON-RPC.

use crate::domain::encoding::{canonical_hex, parse_quantity};
use crate::domain::error::{ChainError, ChainResult};
use crate::domain::types::{Block, Transaction, TransactionReceipt, U256};
use crate::ports::outbound::{BlockTag, ChainReader};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// JSON-RPC error code nodes use for execution reverts
const EXECUTION_REVERTED: i64 = 3;

const NO_PARAMS: [(); 0] = [];

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: T,
    id: u64,
}

/// JSON-RPC response structure.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl From<JsonRpcError> for ChainError {
    fn from(e: JsonRpcError) -> Self {
        let reverted =
            e.code == EXECUTION_REVERTED || e.message.to_ascii_lowercase().contains("revert");
        if reverted {
            match e.data {
                Some(data) => ChainError::Contract(format!("{} ({data})", e.message)),
                None => ChainError::Contract(e.message),
            }
        } else {
            ChainError::upstream(format!("RPC error {}: {}", e.code, e.message))
        }
    }
}

#[derive(Debug, Serialize)]
struct CallRequest<'a> {
    to: &'a str,
    data: String,
}

/// JSON-RPC client for one node endpoint.
pub struct JsonRpcReader {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl JsonRpcReader {
    /// Create a reader whose every HTTP call is bounded by `timeout`.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> ChainResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Make a JSON-RPC call; a `null` result is `Ok(None)`.
    async fn request<P, R>(&self, method: &str, params: P) -> ChainResult<Option<R>>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        trace!(method, id, "Sending JSON-RPC request");

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::upstream(format!(
                "{method}: upstream returned HTTP {status}"
            )));
        }

        let rpc_response: JsonRpcResponse<R> = response.json().await?;
        if let Some(error) = rpc_response.error {
            debug!(method, code = error.code, message = %error.message, "JSON-RPC error");
            return Err(error.into());
        }
        Ok(rpc_response.result)
    }

    /// Like [`request`](Self::request) for methods that always produce a result.
    async fn request_required<P, R>(&self, method: &str, params: P) -> ChainResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        self.request(method, params)
            .await?
            .ok_or_else(|| ChainError::upstream(format!("{method}: response missing result")))
    }
}

#[async_trait]
impl ChainReader for JsonRpcReader {
    async fn chain_id(&self) -> ChainResult<u64> {
        let result: String = self.request_required("eth_chainId", NO_PARAMS).await?;
        parse_quantity(&result).map_err(ChainError::upstream)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        let result: String = self.request_required("eth_blockNumber", NO_PARAMS).await?;
        parse_quantity(&result).map_err(ChainError::upstream)
    }

    async fn block(&self, tag: BlockTag, full_transactions: bool) -> ChainResult<Option<Block>> {
        self.request(
            "eth_getBlockByNumber",
            (tag.to_string(), full_transactions),
        )
        .await
    }

    async fn transaction(&self, hash: &str) -> ChainResult<Option<Transaction>> {
        self.request("eth_getTransactionByHash", [hash]).await
    }

    async fn transaction_receipt(&self, hash: &str) -> ChainResult<Option<TransactionReceipt>> {
        self.request("eth_getTransactionReceipt", [hash]).await
    }

    async fn balance(&self, address: &str) -> ChainResult<U256> {
        self.request_required("eth_getBalance", [address, "latest"])
            .await
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        self.request_required("eth_gasPrice", NO_PARAMS).await
    }

    async fn call(&self, to: &str, data: &[u8]) -> ChainResult<Vec<u8>> {
        let request = CallRequest {
            to,
            data: format!("0x{}", hex::encode(data)),
        };
        let result: String = self
            .request_required("eth_call", (request, "latest"))
            .await?;
        let body = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(body).map_err(|e| ChainError::upstream(format!("eth_call returned bad hex: {e}")))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<String> {
        let payload = format!("0x{}", hex::encode(raw));
        let hash: String = self
            .request_required("eth_sendRawTransaction", [payload])
            .await?;
        canonical_hex(&hash).map_err(ChainError::upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    /// Minimal node answering a handful of methods.
    async fn mock_node(Json(request): Json<Value>) -> Json<Value> {
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default();
        let body = match method {
            "eth_chainId" => json!({"jsonrpc": "2.0", "id": id, "result": "0x38"}),
            "eth_blockNumber" => json!({"jsonrpc": "2.0", "id": id, "result": "0x2a"}),
            "eth_getBalance" => {
                json!({"jsonrpc": "2.0", "id": id, "result": "0xde0b6b3a7640000"})
            }
            "eth_getTransactionReceipt" => json!({"jsonrpc": "2.0", "id": id, "result": null}),
            "eth_call" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": 3, "message": "execution reverted", "data": "0x"}
            }),
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "method not found"}
            }),
        };
        Json(body)
    }

    async fn spawn_node() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", post(mock_node));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_reads_against_mock_node() {
        let url = spawn_node().await;
        let reader = JsonRpcReader::new(url, Duration::from_secs(5)).unwrap();

        assert_eq!(reader.chain_id().await.unwrap(), 56);
        assert_eq!(reader.block_number().await.unwrap(), 42);
        let balance = reader
            .balance("0x4e65fda2159562a496f9f3522f89122a3088497a")
            .await
            .unwrap();
        assert_eq!(balance.to_string(), "1000000000000000000");
        assert!(reader
            .transaction_receipt("0xabc")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_revert_maps_to_contract_error() {
        let url = spawn_node().await;
        let reader = JsonRpcReader::new(url, Duration::from_secs(5)).unwrap();

        let err = reader.call("0x01", &[0x70, 0xa0]).await.unwrap_err();
        assert!(matches!(err, ChainError::Contract(_)));

        let err = reader.gas_price().await.unwrap_err();
        assert!(matches!(err, ChainError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_upstream_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let reader =
            JsonRpcReader::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
        let err = reader.block_number().await.unwrap_err();
        assert!(matches!(err, ChainError::Upstream(_)));
    }
}
