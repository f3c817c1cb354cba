//! In-memory chain doubles for tests.
//!
//! `MockChainReader` serves synthetic blocks up to a movable head, records how
//! often each method is called, and can be scripted to return a sequence of
//! latest-block results (including failures) or to fail a method outright.

use crate::domain::error::{ChainError, ChainResult};
use crate::domain::types::{Block, Transaction, TransactionReceipt, U256};
use crate::ports::outbound::{BlockTag, ChainReader, TimeSource};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Timestamp of synthetic block 0
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
/// Spacing between synthetic blocks, seconds
pub const BLOCK_SPACING: u64 = 3;

/// Chain id served unless overridden (BSC mainnet)
pub const DEFAULT_CHAIN_ID: u64 = 56;

pub mod methods {
    pub const CHAIN_ID: &str = "chain_id";
    pub const BLOCK_NUMBER: &str = "block_number";
    pub const BLOCK: &str = "block";
    pub const TRANSACTION: &str = "transaction";
    pub const TRANSACTION_RECEIPT: &str = "transaction_receipt";
    pub const BALANCE: &str = "balance";
    pub const GAS_PRICE: &str = "gas_price";
    pub const CALL: &str = "call";
    pub const SEND_RAW_TRANSACTION: &str = "send_raw_transaction";
}

/// Synthetic block `number` with the standard spacing.
pub fn make_block(number: u64) -> Block {
    Block {
        number,
        hash: format!("0x{:064x}", number + 1),
        parent_hash: format!("0x{:064x}", number),
        timestamp: GENESIS_TIMESTAMP + number * BLOCK_SPACING,
        transactions: Vec::new(),
        miner: format!("0x{:040x}", 0xbeef),
        gas_used: 21_000,
        gas_limit: 30_000_000,
        size: 1_024,
    }
}

/// Synthetic transaction with the given hash.
pub fn make_transaction(hash: &str, value: U256) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        block_number: Some(1),
        from: format!("0x{:040x}", 1),
        to: Some(format!("0x{:040x}", 2)),
        value,
        gas: 21_000,
        gas_price: U256::from(5_000_000_000u64),
        input: "0x".to_string(),
        nonce: 0,
    }
}

/// Synthetic successful receipt.
pub fn make_receipt(hash: &str) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: hash.to_string(),
        block_number: 1,
        gas_used: 21_000,
        status: true,
        logs: Vec::new(),
        contract_address: None,
    }
}

struct MockState {
    chain_id: u64,
    head: u64,
    blocks: HashMap<u64, Block>,
    latest_script: VecDeque<ChainResult<u64>>,
    transactions: HashMap<String, Transaction>,
    receipts: HashMap<String, (u32, TransactionReceipt)>,
    balances: HashMap<String, U256>,
    gas_price: U256,
    call_results: HashMap<String, ChainResult<Vec<u8>>>,
    failures: HashMap<&'static str, ChainError>,
    sent: Vec<Vec<u8>>,
    calls: HashMap<&'static str, u64>,
    last_call_data: Option<Vec<u8>>,
    latency: Duration,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            head: 0,
            blocks: HashMap::new(),
            latest_script: VecDeque::new(),
            transactions: HashMap::new(),
            receipts: HashMap::new(),
            balances: HashMap::new(),
            gas_price: U256::default(),
            call_results: HashMap::new(),
            failures: HashMap::new(),
            sent: Vec::new(),
            calls: HashMap::new(),
            last_call_data: None,
            latency: Duration::ZERO,
        }
    }
}

/// Scripted in-memory `ChainReader`.
#[derive(Default)]
pub struct MockChainReader {
    state: Mutex<MockState>,
}

impl MockChainReader {
    /// Reader whose chain head is `head`.
    pub fn with_head(head: u64) -> Self {
        let reader = Self::default();
        reader.set_head(head);
        reader
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.lock().chain_id = chain_id;
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Override the block served for `block.number`.
    pub fn insert_block(&self, block: Block) {
        self.state.lock().blocks.insert(block.number, block);
    }

    /// Successive latest-block reads return these numbers (or errors) in order.
    ///
    /// Once exhausted, latest reads serve the current head.
    pub fn script_latest<I>(&self, script: I)
    where
        I: IntoIterator<Item = ChainResult<u64>>,
    {
        self.state.lock().latest_script.extend(script);
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        self.state.lock().transactions.insert(tx.hash.clone(), tx);
    }

    /// Receipt becomes visible after `pending_polls` lookups returned `None`.
    pub fn insert_receipt(&self, receipt: TransactionReceipt, pending_polls: u32) {
        self.state
            .lock()
            .receipts
            .insert(receipt.transaction_hash.clone(), (pending_polls, receipt));
    }

    pub fn set_balance(&self, address: &str, wei: U256) {
        self.state
            .lock()
            .balances
            .insert(address.to_ascii_lowercase(), wei);
    }

    pub fn set_gas_price(&self, wei: U256) {
        self.state.lock().gas_price = wei;
    }

    /// Return data (or failure) for calls to contract `to`.
    pub fn set_call_result(&self, to: &str, result: ChainResult<Vec<u8>>) {
        self.state
            .lock()
            .call_results
            .insert(to.to_ascii_lowercase(), result);
    }

    /// Make every call to `method` fail with `error` until cleared.
    pub fn fail(&self, method: &'static str, error: ChainError) {
        self.state.lock().failures.insert(method, error);
    }

    pub fn clear_failure(&self, method: &'static str) {
        self.state.lock().failures.remove(method);
    }

    /// Delay every call by `latency` (tokio time, so pausable).
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Number of times `method` was invoked.
    pub fn calls(&self, method: &str) -> u64 {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Calldata of the most recent contract call.
    pub fn last_call_data(&self) -> Option<Vec<u8>> {
        self.state.lock().last_call_data.clone()
    }

    /// Raw transactions forwarded so far.
    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Count the call, apply latency, and surface an injected failure.
    async fn enter(&self, method: &'static str) -> ChainResult<()> {
        let latency = {
            let mut state = self.state.lock();
            *state.calls.entry(method).or_insert(0) += 1;
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.state.lock().failures.get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn block_at(state: &MockState, number: u64) -> Option<Block> {
        match state.blocks.get(&number) {
            Some(block) => Some(block.clone()),
            None if number <= state.head => Some(make_block(number)),
            None => None,
        }
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn chain_id(&self) -> ChainResult<u64> {
        self.enter(methods::CHAIN_ID).await?;
        Ok(self.state.lock().chain_id)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.enter(methods::BLOCK_NUMBER).await?;
        Ok(self.state.lock().head)
    }

    async fn block(&self, tag: BlockTag, _full_transactions: bool) -> ChainResult<Option<Block>> {
        self.enter(methods::BLOCK).await?;
        let mut state = self.state.lock();
        let number = match tag {
            BlockTag::Number(n) => n,
            BlockTag::Latest => match state.latest_script.pop_front() {
                Some(Ok(n)) => {
                    state.head = n;
                    n
                }
                Some(Err(e)) => return Err(e),
                None => state.head,
            },
        };
        Ok(Self::block_at(&state, number))
    }

    async fn transaction(&self, hash: &str) -> ChainResult<Option<Transaction>> {
        self.enter(methods::TRANSACTION).await?;
        Ok(self.state.lock().transactions.get(hash).cloned())
    }

    async fn transaction_receipt(&self, hash: &str) -> ChainResult<Option<TransactionReceipt>> {
        self.enter(methods::TRANSACTION_RECEIPT).await?;
        let mut state = self.state.lock();
        match state.receipts.get_mut(hash) {
            Some((pending, _)) if *pending > 0 => {
                *pending -= 1;
                Ok(None)
            }
            Some((_, receipt)) => Ok(Some(receipt.clone())),
            None => Ok(None),
        }
    }

    async fn balance(&self, address: &str) -> ChainResult<U256> {
        self.enter(methods::BALANCE).await?;
        Ok(self
            .state
            .lock()
            .balances
            .get(&address.to_ascii_lowercase())
            .copied()
            .unwrap_or_default())
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        self.enter(methods::GAS_PRICE).await?;
        Ok(self.state.lock().gas_price)
    }

    async fn call(&self, to: &str, data: &[u8]) -> ChainResult<Vec<u8>> {
        self.enter(methods::CALL).await?;
        let mut state = self.state.lock();
        state.last_call_data = Some(data.to_vec());
        state
            .call_results
            .get(&to.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> ChainResult<String> {
        self.enter(methods::SEND_RAW_TRANSACTION).await?;
        let mut state = self.state.lock();
        state.sent.push(raw.to_vec());
        Ok(format!("0x{:064x}", state.sent.len()))
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource(pub DateTime<Utc>);

impl FixedTimeSource {
    /// Clock frozen at a unix timestamp (seconds).
    pub fn at(unix_seconds: i64) -> Self {
        Self(Utc.timestamp_opt(unix_seconds, 0).single().unwrap_or_default())
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
