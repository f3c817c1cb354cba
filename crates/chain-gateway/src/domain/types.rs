//! Core chain and API types with wire serialization.
//!
//! Chain objects keep the upstream camelCase field names. Wei amounts are
//! `U256` and travel as decimal strings; everything that fits `u64` travels as
//! a JSON number.

use crate::domain::encoding::{canonical_hex, hex_string, quantity, status_flag};
use crate::domain::error::{ChainError, ChainResult};
use chrono::{DateTime, TimeZone, Utc};
use primitive_types::U256 as PrimitiveU256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Block number type
pub type BlockNumber = u64;

/// Wei per whole native coin (BNB, ETH)
pub const WEI_PER_NATIVE: f64 = 1e18;

/// Wei per gwei
pub const WEI_PER_GWEI: f64 = 1e9;

/// Display format for block timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// U256 wrapper for wei amounts.
///
/// Serializes as a decimal string (amounts exceed what JSON numbers carry
/// safely); deserializes from `0x` hex, decimal string, or number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct U256(pub PrimitiveU256);

impl U256 {
    pub const ZERO: U256 = U256(PrimitiveU256::zero());

    #[inline]
    pub fn from_dec_str(s: &str) -> Result<Self, &'static str> {
        PrimitiveU256::from_dec_str(s)
            .map(U256)
            .map_err(|_| "invalid decimal string")
    }

    /// Parse `0x` hex or decimal.
    pub fn parse(s: &str) -> Result<Self, &'static str> {
        let s = s.trim();
        if let Some(hex_str) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if hex_str.is_empty() {
                return Ok(U256::ZERO);
            }
            PrimitiveU256::from_str(hex_str)
                .map(U256)
                .map_err(|_| "invalid hex string for U256")
        } else {
            U256::from_dec_str(s)
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn inner(&self) -> &PrimitiveU256 {
        &self.0
    }

    /// Lossy conversion for display denominations.
    pub fn to_f64(&self) -> f64 {
        if self.0.bits() <= 128 {
            self.0.as_u128() as f64
        } else {
            self.0.to_string().parse::<f64>().unwrap_or(f64::MAX)
        }
    }

    /// Amount in whole native coins (wei / 1e18).
    pub fn to_native(&self) -> f64 {
        self.to_f64() / WEI_PER_NATIVE
    }

    /// Amount in gwei (wei / 1e9).
    pub fn to_gwei(&self) -> f64 {
        self.to_f64() / WEI_PER_GWEI
    }
}

impl From<u64> for U256 {
    fn from(v: u64) -> Self {
        U256(PrimitiveU256::from(v))
    }
}

impl From<u128> for U256 {
    fn from(v: u128) -> Self {
        U256(PrimitiveU256::from(v))
    }
}

impl From<PrimitiveU256> for U256 {
    fn from(v: PrimitiveU256) -> Self {
        U256(v)
    }
}

impl From<U256> for PrimitiveU256 {
    fn from(v: U256) -> Self {
        v.0
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Serialize for U256 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct U256Visitor;

        impl<'de> de::Visitor<'de> for U256Visitor {
            type Value = U256;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hex string starting with 0x, a decimal string, or a number")
            }

            fn visit_str<E>(self, value: &str) -> Result<U256, E>
            where
                E: de::Error,
            {
                U256::parse(value).map_err(de::Error::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<U256, E>
            where
                E: de::Error,
            {
                Ok(U256::from(value))
            }

            fn visit_u128<E>(self, value: u128) -> Result<U256, E>
            where
                E: de::Error,
            {
                Ok(U256::from(value))
            }
        }

        deserializer.deserialize_any(U256Visitor)
    }
}

/// Validate and normalise a 20-byte address.
pub fn parse_address(s: &str) -> ChainResult<String> {
    let normalized = canonical_hex(s).map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
    if !s.trim().starts_with("0x") && !s.trim().starts_with("0X") {
        return Err(ChainError::InvalidAddress(s.to_string()));
    }
    if normalized.len() != 42 {
        return Err(ChainError::InvalidAddress(s.to_string()));
    }
    Ok(normalized)
}

/// Validate and normalise a 32-byte transaction hash.
pub fn parse_tx_hash(s: &str) -> ChainResult<String> {
    let normalized = canonical_hex(s)
        .map_err(|_| ChainError::InvalidInput(format!("malformed transaction hash: {s}")))?;
    if normalized.len() != 66 {
        return Err(ChainError::InvalidInput(format!(
            "transaction hash must be 32 bytes: {s}"
        )));
    }
    Ok(normalized)
}

fn format_unix(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// Block as served by the gateway.
///
/// Immutable once produced; cached by number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    #[serde(with = "quantity")]
    pub number: BlockNumber,
    #[serde(with = "hex_string")]
    pub hash: String,
    #[serde(with = "hex_string")]
    pub parent_hash: String,
    /// Unix seconds
    #[serde(with = "quantity")]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<BlockTransaction>,
    #[serde(with = "hex_string")]
    pub miner: String,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(with = "quantity")]
    pub gas_limit: u64,
    #[serde(default, with = "quantity")]
    pub size: u64,
}

impl Block {
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Block time as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn formatted_timestamp(&self) -> String {
        format_unix(self.timestamp)
    }
}

/// Entry of a block's transaction list: a full object or just its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockTransaction {
    Full(Box<Transaction>),
    Hash(#[serde(with = "hex_string")] String),
}

impl BlockTransaction {
    pub fn hash(&self) -> &str {
        match self {
            BlockTransaction::Full(tx) => &tx.hash,
            BlockTransaction::Hash(h) => h,
        }
    }
}

/// Transaction as served by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(with = "hex_string")]
    pub hash: String,
    /// `None` while pending
    #[serde(default, with = "quantity::option")]
    pub block_number: Option<BlockNumber>,
    #[serde(with = "hex_string")]
    pub from: String,
    /// `None` for contract creation
    #[serde(default, with = "hex_string::option")]
    pub to: Option<String>,
    pub value: U256,
    #[serde(with = "quantity")]
    pub gas: u64,
    #[serde(default)]
    pub gas_price: U256,
    #[serde(with = "hex_string")]
    pub input: String,
    #[serde(with = "quantity")]
    pub nonce: u64,
}

impl Transaction {
    /// Transferred value in whole native coins.
    pub fn value_in_native(&self) -> f64 {
        self.value.to_native()
    }

    pub fn gas_price_in_gwei(&self) -> f64 {
        self.gas_price.to_gwei()
    }
}

/// Post-execution record of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(with = "hex_string")]
    pub transaction_hash: String,
    #[serde(with = "quantity")]
    pub block_number: BlockNumber,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    #[serde(with = "status_flag")]
    pub status: bool,
    /// Opaque log records, passed through in order
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,
    #[serde(default, with = "hex_string::option")]
    pub contract_address: Option<String>,
}

/// `GET /api/accounts/{address}/balance`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub address: String,
    pub balance_wei: U256,
    #[serde(rename = "balance_bnb")]
    pub balance_native: f64,
    pub timestamp: String,
}

/// `GET /api/tokens/{token}/balances/{wallet}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub token_address: String,
    pub wallet_address: String,
    pub balance: U256,
    pub timestamp: String,
}

/// `POST /api/contracts/call` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCallRequest {
    pub contract_address: String,
    pub function_name: String,
    #[serde(default)]
    pub function_args: Vec<serde_json::Value>,
    pub abi: Vec<serde_json::Value>,
}

/// `POST /api/contracts/call` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCallResult {
    pub contract_address: String,
    pub function_name: String,
    pub result: serde_json::Value,
    pub timestamp: String,
}

/// `POST /api/transactions/raw` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransactionRequest {
    pub raw_transaction: String,
}

/// `POST /api/transactions/raw` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransactionResult {
    pub tx_hash: String,
    pub timestamp: String,
}

/// Aggregate network statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub latest_block_number: BlockNumber,
    pub latest_block_timestamp: u64,
    pub latest_block_tx_count: usize,
    pub gas_price_gwei: f64,
    /// Mean seconds between consecutive recent blocks; 0.0 when undefined
    pub avg_block_time: f64,
}

impl ChainStats {
    pub fn formatted_block_timestamp(&self) -> String {
        format_unix(self.latest_block_timestamp)
    }
}

/// `GET /api/stats` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: ChainStats,
    pub timestamp: String,
}

/// Payload of a `gas_update` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasUpdate {
    pub gas_price_wei: U256,
    pub gas_price_gwei: f64,
    pub timestamp: String,
}

impl GasUpdate {
    pub fn new(gas_price_wei: U256, observed_at: DateTime<Utc>) -> Self {
        Self {
            gas_price_wei,
            gas_price_gwei: gas_price_wei.to_gwei(),
            timestamp: observed_at.to_rfc3339(),
        }
    }
}

/// Server-pushed WebSocket event: `{"event": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WsEvent {
    NewBlock(Box<Block>),
    GasUpdate(GasUpdate),
}

impl WsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WsEvent::NewBlock(_) => "new_block",
            WsEvent::GasUpdate(_) => "gas_update",
        }
    }
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block_json() -> serde_json::Value {
        serde_json::json!({
            "number": "0x1b4",
            "hash": "0xDC0818CF78F21A8E70579CB46A43643F78291264DDA342AE31049421C82D21AE",
            "parentHash": "0xe99e022112df268087ea7eafaf4790497fd21dbeeb6bd7a1721df161a6657a54",
            "timestamp": "0x55ba467c",
            "miner": "0x4e65fda2159562a496f9f3522f89122a3088497a",
            "gasUsed": "0x9f759",
            "gasLimit": "0x1388",
            "size": "0x220",
            "transactions": [
                "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b"
            ],
            "extraData": "0x"
        })
    }

    #[test]
    fn test_block_from_rpc_json() {
        let block: Block = serde_json::from_value(sample_block_json()).unwrap();
        assert_eq!(block.number, 436);
        assert_eq!(block.timestamp, 0x55ba467c);
        assert_eq!(block.tx_count(), 1);
        // hash normalised to lowercase
        assert!(block.hash.starts_with("0xdc0818cf"));
        assert!(matches!(block.transactions[0], BlockTransaction::Hash(_)));
    }

    #[test]
    fn test_block_serializes_numbers() {
        let block: Block = serde_json::from_value(sample_block_json()).unwrap();
        let out = serde_json::to_value(&block).unwrap();
        assert_eq!(out["number"], 436);
        assert_eq!(out["gasLimit"], 5000);
        assert_eq!(out["parentHash"], block.parent_hash.as_str());
    }

    #[test]
    fn test_full_transaction_in_block() {
        let mut json = sample_block_json();
        json["transactions"] = serde_json::json!([{
            "hash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "from": "0xa7d9ddbe1f17865597fbd27ec712455208b6b76d",
            "to": null,
            "value": "0xde0b6b3a7640000",
            "gas": "0xc350",
            "gasPrice": "0x4a817c800",
            "input": "0x68656c6c6f21",
            "nonce": "0x15"
        }]);
        let block: Block = serde_json::from_value(json).unwrap();
        match &block.transactions[0] {
            BlockTransaction::Full(tx) => {
                assert!(tx.to.is_none());
                assert_eq!(tx.value_in_native(), 1.0);
                assert_eq!(tx.gas_price_in_gwei(), 20.0);
                assert_eq!(tx.nonce, 21);
            }
            other => panic!("expected full transaction, got {:?}", other),
        }
    }

    #[test]
    fn test_receipt_status_flag() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "gasUsed": "0x5208",
            "status": "0x1",
            "logs": [{"address": "0x01"}],
            "contractAddress": null
        }))
        .unwrap();
        assert!(receipt.status);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(serde_json::to_value(&receipt).unwrap()["status"], 1);
    }

    #[test]
    fn test_u256_parsing_and_display() {
        assert_eq!(U256::parse("0x10").unwrap(), U256::from(16u64));
        assert_eq!(U256::parse("16").unwrap(), U256::from(16u64));
        let big = U256::from(1_000_000_000_000_000_000u128);
        assert_eq!(serde_json::to_value(big).unwrap(), "1000000000000000000");
        assert_eq!(big.to_native(), 1.0);
    }

    #[test]
    fn test_ws_event_shape() {
        let update = GasUpdate::new(U256::from(5_000_000_000u64), Utc::now());
        let json = serde_json::to_value(WsEvent::GasUpdate(update)).unwrap();
        assert_eq!(json["event"], "gas_update");
        assert_eq!(json["data"]["gas_price_wei"], "5000000000");
        assert_eq!(json["data"]["gas_price_gwei"], 5.0);
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x4E65FDA2159562A496F9F3522F89122A3088497A").unwrap();
        assert_eq!(addr, "0x4e65fda2159562a496f9f3522f89122a3088497a");
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("4e65fda2159562a496f9f3522f89122a3088497a").is_err());
        assert!(matches!(
            parse_address("0xZZ65fda2159562a496f9f3522f89122a3088497a"),
            Err(ChainError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_parse_tx_hash() {
        assert!(parse_tx_hash(
            "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b"
        )
        .is_ok());
        assert!(matches!(
            parse_tx_hash("0x88df"),
            Err(ChainError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_formatted_timestamp() {
        let block = Block {
            number: 1,
            hash: "0x01".into(),
            parent_hash: "0x00".into(),
            timestamp: 0,
            transactions: vec![],
            miner: "0x00".into(),
            gas_used: 0,
            gas_limit: 0,
            size: 0,
        };
        assert_eq!(block.formatted_timestamp(), "1970-01-01 00:00:00");
    }
}
