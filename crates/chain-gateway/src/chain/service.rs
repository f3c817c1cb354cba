//! Chain read service.
//!
//! Orchestrates the upstream `ChainReader` and the block/transaction caches.
//! Blocks and transactions are immutable once produced and served cache-first;
//! balances, gas price, receipts and contract calls are always fresh reads.

use crate::chain::cache::{BoundedCache, CacheStats};
use crate::chain::validation::validate_raw_transaction;
use crate::domain::abi::{erc20_balance_of_abi, AbiFunction};
use crate::domain::config::GatewayConfig;
use crate::domain::error::{ChainError, ChainResult};
use crate::domain::types::{
    parse_address, parse_tx_hash, Block, ChainStats, Transaction, TransactionReceipt, U256,
};
use crate::ports::outbound::{BlockTag, ChainReader, SystemTimeSource, TimeSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Tunables for [`ChainService`]
#[derive(Debug, Clone)]
pub struct ChainServiceConfig {
    pub max_cached_blocks: usize,
    pub max_cached_transactions: usize,
    pub receipt_wait: Duration,
    pub receipt_poll_interval: Duration,
    pub max_latest_blocks: u64,
    pub max_raw_tx_size: usize,
    pub stats_window: u64,
}

impl Default for ChainServiceConfig {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for ChainServiceConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_cached_blocks: config.cache.max_blocks,
            max_cached_transactions: config.cache.max_transactions,
            receipt_wait: config.timeouts.receipt_wait,
            receipt_poll_interval: config.timeouts.receipt_poll_interval,
            max_latest_blocks: config.limits.max_latest_blocks,
            max_raw_tx_size: config.limits.max_raw_tx_size,
            stats_window: config.limits.stats_window,
        }
    }
}

/// Read API over one chain endpoint.
pub struct ChainService {
    reader: Arc<dyn ChainReader>,
    clock: Arc<dyn TimeSource>,
    blocks: BoundedCache<u64, Block>,
    transactions: BoundedCache<String, Transaction>,
    config: ChainServiceConfig,
}

impl ChainService {
    pub fn new(reader: Arc<dyn ChainReader>, config: ChainServiceConfig) -> Self {
        Self::with_clock(reader, Arc::new(SystemTimeSource), config)
    }

    pub fn with_clock(
        reader: Arc<dyn ChainReader>,
        clock: Arc<dyn TimeSource>,
        config: ChainServiceConfig,
    ) -> Self {
        Self {
            reader,
            clock,
            blocks: BoundedCache::new("blocks", config.max_cached_blocks),
            transactions: BoundedCache::new("transactions", config.max_cached_transactions),
            config,
        }
    }

    pub fn config(&self) -> &ChainServiceConfig {
        &self.config
    }

    /// Chain id reported by the upstream node.
    #[instrument(skip(self))]
    pub async fn chain_id(&self) -> ChainResult<u64> {
        self.reader.chain_id().await
    }

    /// Observation time for response timestamps.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Latest block; always fetched, then cached under its number.
    #[instrument(skip(self))]
    pub async fn get_latest_block(&self) -> ChainResult<Block> {
        let block = self
            .reader
            .block(BlockTag::Latest, true)
            .await?
            .ok_or_else(|| ChainError::not_found("latest block"))?;
        self.blocks.insert(block.number, block.clone());
        Ok(block)
    }

    /// Block by number, cache-first.
    #[instrument(skip(self))]
    pub async fn get_block(&self, number: u64) -> ChainResult<Block> {
        if let Some(block) = self.blocks.get(&number) {
            debug!(block_number = number, "Block cache hit");
            return Ok(block);
        }

        let block = self
            .reader
            .block(BlockTag::Number(number), true)
            .await?
            .ok_or_else(|| ChainError::not_found(format!("block {number}")))?;
        self.blocks.insert(number, block.clone());
        Ok(block)
    }

    /// Up to `count` most recent blocks, newest first.
    #[instrument(skip(self))]
    pub async fn get_latest_blocks(&self, count: u64) -> ChainResult<Vec<Block>> {
        if count > self.config.max_latest_blocks {
            return Err(ChainError::InvalidInput(format!(
                "count {count} exceeds limit {}",
                self.config.max_latest_blocks
            )));
        }
        let latest = self.reader.block_number().await?;
        self.blocks_descending(latest, count).await
    }

    /// `count` blocks from `from` downwards, stopping at genesis.
    async fn blocks_descending(&self, from: u64, count: u64) -> ChainResult<Vec<Block>> {
        let numbers = (0..count).map_while(|i| from.checked_sub(i));
        let mut blocks = Vec::with_capacity(count.min(from.saturating_add(1)) as usize);
        for number in numbers {
            blocks.push(self.get_block(number).await?);
        }
        Ok(blocks)
    }

    /// Transaction by hash, cache-first.
    #[instrument(skip(self))]
    pub async fn get_transaction(&self, hash: &str) -> ChainResult<Transaction> {
        let hash = parse_tx_hash(hash)?;
        if let Some(tx) = self.transactions.get(&hash) {
            return Ok(tx);
        }

        let tx = self
            .reader
            .transaction(&hash)
            .await?
            .ok_or_else(|| ChainError::not_found(format!("transaction {hash}")))?;
        self.transactions.insert(hash, tx.clone());
        Ok(tx)
    }

    /// Receipt by hash, waiting for inclusion up to the configured limit.
    #[instrument(skip(self))]
    pub async fn get_transaction_receipt(&self, hash: &str) -> ChainResult<TransactionReceipt> {
        let hash = parse_tx_hash(hash)?;
        let wait = self.config.receipt_wait;
        let poll = self.config.receipt_poll_interval;

        let lookup = async {
            loop {
                match self.reader.transaction_receipt(&hash).await {
                    Ok(Some(receipt)) => return Ok::<_, ChainError>(receipt),
                    Ok(None) => debug!(tx_hash = %hash, "Receipt not available yet"),
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(poll).await;
            }
        };

        match tokio::time::timeout(wait, lookup).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout(format!(
                "transaction {hash} not mined within {}s",
                wait.as_secs()
            ))),
        }
    }

    /// Native balance in wei; never cached.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, address: &str) -> ChainResult<U256> {
        let address = parse_address(address)?;
        self.reader.balance(&address).await
    }

    /// ERC-20 `balanceOf(wallet)` on `token`.
    #[instrument(skip(self))]
    pub async fn get_token_balance(&self, token: &str, wallet: &str) -> ChainResult<U256> {
        let token = parse_address(token)?;
        let wallet = parse_address(wallet)?;

        let function = AbiFunction::resolve(&erc20_balance_of_abi(), "balanceOf", 1)?;
        let calldata = function.encode_call(&[serde_json::Value::String(wallet)])?;
        let data = self.reader.call(&token, &calldata).await?;

        function
            .decode_output_values(&data)?
            .first()
            .and_then(|v| v.as_uint())
            .map(U256::from)
            .ok_or_else(|| ChainError::Contract("balanceOf returned no uint256".into()))
    }

    /// Current gas price in wei; never cached.
    #[instrument(skip(self))]
    pub async fn get_gas_price(&self) -> ChainResult<U256> {
        self.reader.gas_price().await
    }

    /// Read-only contract call decoded against the caller's ABI.
    #[instrument(skip(self, abi, args))]
    pub async fn call_contract(
        &self,
        contract: &str,
        abi: &[serde_json::Value],
        function_name: &str,
        args: &[serde_json::Value],
    ) -> ChainResult<serde_json::Value> {
        let contract = parse_address(contract)?;
        let function = AbiFunction::resolve(abi, function_name, args.len())?;
        let calldata = function.encode_call(args)?;
        debug!(signature = %function.signature(), "Calling contract");

        let data = self.reader.call(&contract, &calldata).await?;
        function.decode_output(&data)
    }

    /// Latest block, gas price and average block time over the stats window.
    #[instrument(skip(self))]
    pub async fn get_stats(&self) -> ChainResult<ChainStats> {
        let latest = self.get_latest_block().await?;
        let gas_price = self.get_gas_price().await?;
        let recent = self
            .blocks_descending(latest.number, self.config.stats_window)
            .await?;

        Ok(ChainStats {
            latest_block_number: latest.number,
            latest_block_timestamp: latest.timestamp,
            latest_block_tx_count: latest.tx_count(),
            gas_price_gwei: gas_price.to_gwei(),
            avg_block_time: average_block_time(&recent),
        })
    }

    /// Forward an already-signed transaction after pre-validation.
    #[instrument(skip(self, raw))]
    pub async fn send_raw_transaction(&self, raw: &str) -> ChainResult<String> {
        let validated = validate_raw_transaction(raw, self.config.max_raw_tx_size)?;
        let tx_hash = self.reader.send_raw_transaction(&validated.bytes).await?;
        if tx_hash != validated.hash {
            warn!(
                expected = %validated.hash,
                returned = %tx_hash,
                "Upstream returned unexpected transaction hash"
            );
        }
        Ok(tx_hash)
    }

    pub fn block_cache_stats(&self) -> CacheStats {
        self.blocks.stats()
    }

    pub fn transaction_cache_stats(&self) -> CacheStats {
        self.transactions.stats()
    }
}

/// Mean of consecutive timestamp deltas; 0.0 with fewer than two blocks.
pub fn average_block_time(blocks: &[Block]) -> f64 {
    if blocks.len() < 2 {
        return 0.0;
    }
    let total: u64 = blocks
        .windows(2)
        .map(|pair| pair[0].timestamp.abs_diff(pair[1].timestamp))
        .sum();
    total as f64 / (blocks.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_block, make_receipt, make_transaction, methods, MockChainReader};
    use serde_json::json;

    const WALLET: &str = "0x4E65FDA2159562A496F9F3522F89122A3088497A";
    const TOKEN: &str = "0x55d398326f99059ff775485246999027b3197955";

    fn service(reader: &Arc<MockChainReader>) -> ChainService {
        ChainService::new(reader.clone(), ChainServiceConfig::default())
    }

    fn tx_hash(n: u8) -> String {
        format!("0x{}", hex::encode([n; 32]))
    }

    #[tokio::test]
    async fn test_get_block_served_from_cache() {
        let reader = Arc::new(MockChainReader::with_head(100));
        let service = service(&reader);

        let first = service.get_block(42).await.unwrap();
        let second = service.get_block(42).await.unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(reader.calls(methods::BLOCK), 1);
        assert_eq!(service.block_cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_get_block_not_found() {
        let reader = Arc::new(MockChainReader::with_head(10));
        let service = service(&reader);

        let err = service.get_block(11).await.unwrap_err();
        assert!(matches!(err, ChainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_latest_block_always_fresh_but_cached_by_number() {
        let reader = Arc::new(MockChainReader::with_head(7));
        let service = service(&reader);

        service.get_latest_block().await.unwrap();
        service.get_latest_block().await.unwrap();
        assert_eq!(reader.calls(methods::BLOCK), 2);

        // Served from the entry written by the latest read
        service.get_block(7).await.unwrap();
        assert_eq!(reader.calls(methods::BLOCK), 2);
    }

    #[tokio::test]
    async fn test_latest_blocks_descending_and_bounded() {
        let reader = Arc::new(MockChainReader::with_head(100));
        let service = service(&reader);

        let blocks = service.get_latest_blocks(5).await.unwrap();
        let numbers: Vec<u64> = blocks.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![100, 99, 98, 97, 96]);
        assert_eq!(reader.calls(methods::BLOCK_NUMBER), 1);
    }

    #[tokio::test]
    async fn test_latest_blocks_stops_at_genesis() {
        let reader = Arc::new(MockChainReader::with_head(2));
        let service = service(&reader);

        let blocks = service.get_latest_blocks(10).await.unwrap();
        let numbers: Vec<u64> = blocks.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![2, 1, 0]);

        assert!(service.get_latest_blocks(0).await.unwrap().is_empty());
        assert!(matches!(
            service.get_latest_blocks(1_000).await,
            Err(ChainError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_and_gas_price_never_cached() {
        let reader = Arc::new(MockChainReader::with_head(1));
        reader.set_balance(WALLET, U256::from(1_000_000_000_000_000_000u64));
        reader.set_gas_price(U256::from(3_000_000_000u64));
        let service = service(&reader);

        let a = service.get_balance(WALLET).await.unwrap();
        let b = service.get_balance(WALLET).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_native(), 1.0);
        assert_eq!(reader.calls(methods::BALANCE), 2);

        service.get_gas_price().await.unwrap();
        service.get_gas_price().await.unwrap();
        assert_eq!(reader.calls(methods::GAS_PRICE), 2);
    }

    #[tokio::test]
    async fn test_balance_rejects_bad_address() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let service = service(&reader);

        let err = service.get_balance("0x1234").await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidAddress(_)));
        assert_eq!(reader.calls(methods::BALANCE), 0);
    }

    #[tokio::test]
    async fn test_transaction_cache_and_not_found() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let hash = tx_hash(0xaa);
        reader.insert_transaction(make_transaction(&hash, U256::from(5u64)));
        let service = service(&reader);

        // Uppercase input normalises to the same cache key
        let upper = format!("0x{}", hash[2..].to_ascii_uppercase());
        service.get_transaction(&hash).await.unwrap();
        service.get_transaction(&upper).await.unwrap();
        assert_eq!(reader.calls(methods::TRANSACTION), 1);

        let err = service.get_transaction(&tx_hash(0xbb)).await.unwrap_err();
        assert!(matches!(err, ChainError::NotFound(_)));
        let err = service.get_transaction("0xdead").await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_polls_until_mined() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let hash = tx_hash(0x01);
        reader.insert_receipt(make_receipt(&hash), 2);
        let service = service(&reader);

        let receipt = service.get_transaction_receipt(&hash).await.unwrap();
        assert!(receipt.status);
        assert_eq!(reader.calls(methods::TRANSACTION_RECEIPT), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_times_out() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let config = ChainServiceConfig {
            receipt_wait: Duration::from_secs(5),
            receipt_poll_interval: Duration::from_secs(1),
            ..ChainServiceConfig::default()
        };
        let service = ChainService::new(reader.clone(), config);

        let err = service
            .get_transaction_receipt(&tx_hash(0x02))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Timeout(_)));
        assert!(reader.calls(methods::TRANSACTION_RECEIPT) >= 5);
    }

    #[tokio::test]
    async fn test_token_balance_uses_balance_of() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let mut word = vec![0u8; 32];
        word[30] = 0x03;
        word[31] = 0xe8;
        reader.set_call_result(TOKEN, Ok(word));
        let service = service(&reader);

        let balance = service.get_token_balance(TOKEN, WALLET).await.unwrap();
        assert_eq!(balance, U256::from(1000u64));

        let calldata = reader.last_call_data().unwrap();
        assert_eq!(&calldata[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(calldata.len(), 36);
    }

    #[tokio::test]
    async fn test_token_balance_on_non_contract() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let service = service(&reader);

        let err = service.get_token_balance(TOKEN, WALLET).await.unwrap_err();
        assert!(matches!(err, ChainError::Contract(_)));
        let err = service.get_token_balance("token", WALLET).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_call_contract_decodes_and_is_not_cached() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let mut word = vec![0u8; 32];
        word[31] = 18;
        reader.set_call_result(TOKEN, Ok(word));
        let service = service(&reader);

        let abi = vec![json!({
            "type": "function",
            "name": "decimals",
            "inputs": [],
            "outputs": [{"name": "", "type": "uint8"}]
        })];
        let first = service.call_contract(TOKEN, &abi, "decimals", &[]).await.unwrap();
        let second = service.call_contract(TOKEN, &abi, "decimals", &[]).await.unwrap();
        assert_eq!(first, json!("18"));
        assert_eq!(first, second);
        assert_eq!(reader.calls(methods::CALL), 2);

        let err = service
            .call_contract(TOKEN, &abi, "symbol", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::AbiMismatch(_)));
    }

    #[tokio::test]
    async fn test_stats_average_block_time() {
        let reader = Arc::new(MockChainReader::with_head(50));
        reader.set_gas_price(U256::from(5_000_000_000u64));
        let service = service(&reader);

        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.latest_block_number, 50);
        assert_eq!(stats.gas_price_gwei, 5.0);
        assert_eq!(stats.avg_block_time, crate::testing::BLOCK_SPACING as f64);
    }

    #[tokio::test]
    async fn test_stats_near_genesis_has_zero_average() {
        let reader = Arc::new(MockChainReader::with_head(0));
        let service = service(&reader);

        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.latest_block_number, 0);
        assert_eq!(stats.avg_block_time, 0.0);
    }

    #[test]
    fn test_average_block_time_uneven_spacing() {
        let mut blocks = vec![make_block(3), make_block(2), make_block(1)];
        blocks[0].timestamp = 110;
        blocks[1].timestamp = 104;
        blocks[2].timestamp = 100;
        assert_eq!(average_block_time(&blocks), 5.0);
        assert_eq!(average_block_time(&blocks[..1]), 0.0);
        assert_eq!(average_block_time(&[]), 0.0);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let reader = Arc::new(MockChainReader::with_head(5));
        reader.fail(methods::GAS_PRICE, ChainError::upstream("connection refused"));
        let service = service(&reader);

        assert!(matches!(
            service.get_stats().await,
            Err(ChainError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_send_raw_transaction_validates_first() {
        let reader = Arc::new(MockChainReader::with_head(1));
        let service = service(&reader);

        let err = service.send_raw_transaction("0x1234").await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidInput(_)));
        assert_eq!(reader.calls(methods::SEND_RAW_TRANSACTION), 0);
    }
}
