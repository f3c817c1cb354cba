//! Outbound ports for the chain gateway.

use crate::domain::error::ChainResult;
use crate::domain::types::{Block, Transaction, TransactionReceipt, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// Block selector for upstream reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Number(u64),
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => f.write_str("latest"),
            BlockTag::Number(n) => write!(f, "0x{n:x}"),
        }
    }
}

/// Read access to a single chain node.
///
/// Implementations are fallible and may be slow; callers time-box them.
/// Absent blocks, transactions and receipts are `Ok(None)`, not errors.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Chain identifier reported by the node
    async fn chain_id(&self) -> ChainResult<u64>;

    /// Current head number
    async fn block_number(&self) -> ChainResult<u64>;

    /// Block by tag, with full transaction objects when `full_transactions`
    async fn block(&self, tag: BlockTag, full_transactions: bool) -> ChainResult<Option<Block>>;

    async fn transaction(&self, hash: &str) -> ChainResult<Option<Transaction>>;

    /// `None` while the transaction is pending or unknown
    async fn transaction_receipt(&self, hash: &str) -> ChainResult<Option<TransactionReceipt>>;

    /// Native balance in wei at the latest block
    async fn balance(&self, address: &str) -> ChainResult<U256>;

    /// Current gas price in wei
    async fn gas_price(&self) -> ChainResult<U256>;

    /// Read-only `eth_call` against the latest block, returning raw return data
    async fn call(&self, to: &str, data: &[u8]) -> ChainResult<Vec<u8>>;

    /// Forward an already-signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<String>;
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System time implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
