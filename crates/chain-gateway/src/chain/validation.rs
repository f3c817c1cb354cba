//! Pre-validation of signed raw transactions before forwarding.
//!
//! Purely syntactic: hex decoding, size bounds, envelope type, and RLP list
//! shape. Signatures, nonces and balances are the node's business.

use crate::domain::error::{ChainError, ChainResult};
use rlp::{DecoderError, Rlp};
use sha3::{Digest, Keccak256};
use tracing::debug;

/// Minimum transaction size (empty tx ~= 85 bytes)
const MIN_TX_SIZE: usize = 85;

/// Transaction envelope type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Legacy,
    AccessList, // EIP-2930
    DynamicFee, // EIP-1559
    Blob,       // EIP-4844
    SetCode,    // EIP-7702
}

impl TxType {
    /// Field count of the signed RLP payload
    fn field_count(self) -> usize {
        match self {
            TxType::Legacy => 9,
            TxType::AccessList => 11,
            TxType::DynamicFee => 12,
            TxType::SetCode => 13,
            TxType::Blob => 14,
        }
    }
}

/// A raw transaction that passed pre-validation
#[derive(Debug, Clone)]
pub struct ValidatedRawTx {
    pub bytes: Vec<u8>,
    pub tx_type: TxType,
    /// keccak256 of the envelope, i.e. the expected transaction hash
    pub hash: String,
}

/// Decode and validate a `0x`-prefixed raw transaction.
pub fn validate_raw_transaction(raw_hex: &str, max_size: usize) -> ChainResult<ValidatedRawTx> {
    let trimmed = raw_hex.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty transaction"));
    }
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    // Reject before decoding so oversized payloads are never allocated
    if body.len() / 2 > max_size {
        return Err(invalid(format!(
            "transaction size {} exceeds limit {max_size}",
            body.len() / 2
        )));
    }
    let bytes = hex::decode(body).map_err(|e| invalid(format!("transaction is not hex: {e}")))?;

    if bytes.len() < MIN_TX_SIZE {
        return Err(invalid("transaction too small"));
    }

    let (tx_type, payload) = detect_tx_type(&bytes)?;
    check_rlp_list(payload, tx_type.field_count())?;

    let hash = format!("0x{}", hex::encode(Keccak256::digest(&bytes)));
    debug!(hash = %hash, tx_type = ?tx_type, size = bytes.len(), "Validated raw transaction");

    Ok(ValidatedRawTx {
        bytes,
        tx_type,
        hash,
    })
}

/// Detect transaction type from first byte
fn detect_tx_type(raw: &[u8]) -> ChainResult<(TxType, &[u8])> {
    let Some(&first_byte) = raw.first() else {
        return Err(invalid("empty transaction"));
    };

    // EIP-2718: typed envelopes start below 0x7f, legacy with an RLP list prefix
    if first_byte >= 0xc0 {
        return Ok((TxType::Legacy, raw));
    }
    let tx_type = match first_byte {
        0x01 => TxType::AccessList,
        0x02 => TxType::DynamicFee,
        0x03 => TxType::Blob,
        0x04 => TxType::SetCode,
        _ => {
            return Err(invalid(format!(
                "unknown transaction type: 0x{first_byte:02x}"
            )))
        }
    };
    Ok((tx_type, &raw[1..]))
}

fn check_rlp_list(data: &[u8], expected_fields: usize) -> ChainResult<()> {
    let rlp = Rlp::new(data);
    if !rlp.is_list() {
        return Err(invalid("transaction payload is not an RLP list"));
    }

    let info = rlp.payload_info().map_err(|e| rlp_error("header", e))?;
    if info.total() != data.len() {
        return Err(invalid(format!(
            "RLP length mismatch: header declares {} bytes, got {}",
            info.total(),
            data.len()
        )));
    }

    let item_count = rlp.item_count().map_err(|e| rlp_error("item count", e))?;
    if item_count != expected_fields {
        return Err(invalid(format!(
            "expected {expected_fields} transaction fields, got {item_count}"
        )));
    }
    Ok(())
}

fn rlp_error(context: &str, e: DecoderError) -> ChainError {
    invalid(format!("malformed RLP ({context}): {e}"))
}

fn invalid(details: impl Into<String>) -> ChainError {
    ChainError::InvalidInput(details.into())
}
