//! Contract ABI handling for read-only calls.
//!
//! Arguments arrive as JSON and are coerced against the caller-supplied ABI
//! fragment into [`AbiValue`]s, encoded per the Solidity ABI head/tail layout,
//! and the return data is decoded back using the declared outputs.
//!
//! Supported types: `uint<N>`, `int<N>`, `bool`, `address`, `bytes<N>`,
//! `bytes`, `string`, `T[]`, `T[k]`. Tuples are rejected.

use crate::domain::encoding::canonical_hex;
use crate::domain::error::{ChainError, ChainResult};
use primitive_types::U256;
use serde::{Deserialize, Serialize, Serializer};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

/// Largest accepted `T[k]` dimension
pub const MAX_FIXED_ARRAY_LEN: usize = 1024;

/// Parameter entry of an ABI item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One entry of a JSON ABI (functions, events, constructors...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiItem {
    #[serde(rename = "type", default = "default_item_type")]
    pub item_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
}

fn default_item_type() -> String {
    "function".to_string()
}

/// ABI parameter type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Uint(usize),
    Int(usize),
    Bool,
    Address,
    FixedBytes(usize),
    Bytes,
    String,
    Array(Box<ParamType>),
    FixedArray(Box<ParamType>, usize),
}

impl ParamType {
    /// Parse a Solidity type name.
    pub fn parse(s: &str) -> ChainResult<Self> {
        let s = s.trim();
        if let Some(stripped) = s.strip_suffix(']') {
            let open = stripped
                .rfind('[')
                .ok_or_else(|| mismatch(format!("malformed array type: {s}")))?;
            let inner = ParamType::parse(&stripped[..open])?;
            let dim = &stripped[open + 1..];
            return if dim.is_empty() {
                Ok(ParamType::Array(Box::new(inner)))
            } else {
                let len = dim
                    .parse::<usize>()
                    .map_err(|_| mismatch(format!("malformed array length: {s}")))?;
                if len > MAX_FIXED_ARRAY_LEN {
                    return Err(mismatch(format!(
                        "array length {len} exceeds {MAX_FIXED_ARRAY_LEN}: {s}"
                    )));
                }
                Ok(ParamType::FixedArray(Box::new(inner), len))
            };
        }

        match s {
            "bool" => Ok(ParamType::Bool),
            "address" => Ok(ParamType::Address),
            "bytes" => Ok(ParamType::Bytes),
            "string" => Ok(ParamType::String),
            "uint" => Ok(ParamType::Uint(256)),
            "int" => Ok(ParamType::Int(256)),
            _ if s.starts_with("tuple") || s.starts_with('(') => {
                Err(mismatch(format!("unsupported ABI type: {s}")))
            }
            _ => {
                if let Some(bits) = s.strip_prefix("uint") {
                    Ok(ParamType::Uint(parse_bits(s, bits)?))
                } else if let Some(bits) = s.strip_prefix("int") {
                    Ok(ParamType::Int(parse_bits(s, bits)?))
                } else if let Some(len) = s.strip_prefix("bytes") {
                    match len.parse::<usize>() {
                        Ok(n) if (1..=32).contains(&n) => Ok(ParamType::FixedBytes(n)),
                        _ => Err(mismatch(format!("invalid fixed bytes type: {s}"))),
                    }
                } else {
                    Err(mismatch(format!("unsupported ABI type: {s}")))
                }
            }
        }
    }

    /// Whether the encoding lives in the tail section.
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Bytes | ParamType::String | ParamType::Array(_) => true,
            ParamType::FixedArray(inner, _) => inner.is_dynamic(),
            _ => false,
        }
    }

    /// Canonical name used in function signatures.
    pub fn canonical(&self) -> String {
        match self {
            ParamType::Uint(bits) => format!("uint{bits}"),
            ParamType::Int(bits) => format!("int{bits}"),
            ParamType::Bool => "bool".to_string(),
            ParamType::Address => "address".to_string(),
            ParamType::FixedBytes(n) => format!("bytes{n}"),
            ParamType::Bytes => "bytes".to_string(),
            ParamType::String => "string".to_string(),
            ParamType::Array(inner) => format!("{}[]", inner.canonical()),
            ParamType::FixedArray(inner, n) => format!("{}[{n}]", inner.canonical()),
        }
    }

    /// Head size of a static type.
    fn head_size(&self) -> ChainResult<usize> {
        match self {
            ParamType::FixedArray(inner, n) if !self.is_dynamic() => inner
                .head_size()?
                .checked_mul(*n)
                .ok_or_else(|| mismatch(format!("type {} is too large", self.canonical()))),
            _ => Ok(WORD),
        }
    }
}

fn parse_bits(full: &str, bits: &str) -> ChainResult<usize> {
    match bits.parse::<usize>() {
        Ok(n) if n > 0 && n <= 256 && n % 8 == 0 => Ok(n),
        _ => Err(mismatch(format!("invalid integer width: {full}"))),
    }
}

fn mismatch(details: impl Into<String>) -> ChainError {
    ChainError::AbiMismatch(details.into())
}

/// Typed ABI value.
///
/// `Int` holds the 256-bit two's complement word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(U256),
    Int(U256),
    Bool(bool),
    Address(String),
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<AbiValue>),
}

impl AbiValue {
    /// JSON rendering: integers as decimal strings, bytes as hex.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AbiValue::Uint(v) => serde_json::Value::String(v.to_string()),
            AbiValue::Int(raw) => serde_json::Value::String(signed_to_string(*raw)),
            AbiValue::Bool(b) => serde_json::Value::Bool(*b),
            AbiValue::Address(a) => serde_json::Value::String(a.clone()),
            AbiValue::FixedBytes(b) | AbiValue::Bytes(b) => {
                serde_json::Value::String(format!("0x{}", hex::encode(b)))
            }
            AbiValue::String(s) => serde_json::Value::String(s.clone()),
            AbiValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(AbiValue::to_json).collect())
            }
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            AbiValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Coerce a JSON argument into a value of type `ty`.
    pub fn from_json(ty: &ParamType, value: &serde_json::Value) -> ChainResult<Self> {
        match ty {
            ParamType::Uint(bits) => {
                let v = json_to_u256(value)?;
                if v.bits() > *bits {
                    return Err(mismatch(format!("value {v} overflows uint{bits}")));
                }
                Ok(AbiValue::Uint(v))
            }
            ParamType::Int(bits) => json_to_int(value, *bits).map(AbiValue::Int),
            ParamType::Bool => match value {
                serde_json::Value::Bool(b) => Ok(AbiValue::Bool(*b)),
                serde_json::Value::String(s) if s == "true" => Ok(AbiValue::Bool(true)),
                serde_json::Value::String(s) if s == "false" => Ok(AbiValue::Bool(false)),
                other => Err(mismatch(format!("expected bool, got {other}"))),
            },
            ParamType::Address => {
                let s = value
                    .as_str()
                    .ok_or_else(|| mismatch(format!("expected address string, got {value}")))?;
                let normalized =
                    canonical_hex(s).map_err(|_| mismatch(format!("invalid address: {s}")))?;
                if normalized.len() != 42 {
                    return Err(mismatch(format!("invalid address: {s}")));
                }
                Ok(AbiValue::Address(normalized))
            }
            ParamType::FixedBytes(n) => {
                let bytes = json_to_bytes(value)?;
                if bytes.len() > *n {
                    return Err(mismatch(format!(
                        "{} bytes do not fit bytes{n}",
                        bytes.len()
                    )));
                }
                Ok(AbiValue::FixedBytes(bytes))
            }
            ParamType::Bytes => json_to_bytes(value).map(AbiValue::Bytes),
            ParamType::String => value
                .as_str()
                .map(|s| AbiValue::String(s.to_string()))
                .ok_or_else(|| mismatch(format!("expected string, got {value}"))),
            ParamType::Array(inner) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| mismatch(format!("expected array, got {value}")))?;
                items
                    .iter()
                    .map(|item| AbiValue::from_json(inner, item))
                    .collect::<ChainResult<Vec<_>>>()
                    .map(AbiValue::Array)
            }
            ParamType::FixedArray(inner, len) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| mismatch(format!("expected array, got {value}")))?;
                if items.len() != *len {
                    return Err(mismatch(format!(
                        "expected {len} elements, got {}",
                        items.len()
                    )));
                }
                items
                    .iter()
                    .map(|item| AbiValue::from_json(inner, item))
                    .collect::<ChainResult<Vec<_>>>()
                    .map(AbiValue::Array)
            }
        }
    }
}

impl Serialize for AbiValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

fn signed_to_string(raw: U256) -> String {
    if raw.bit(255) {
        let magnitude = (!raw).overflowing_add(U256::one()).0;
        format!("-{magnitude}")
    } else {
        raw.to_string()
    }
}

fn parse_u256_str(s: &str) -> ChainResult<U256> {
    let s = s.trim();
    if let Some(hex_str) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        U256::from_str_radix(hex_str, 16).map_err(|_| mismatch(format!("invalid hex integer: {s}")))
    } else {
        U256::from_dec_str(s).map_err(|_| mismatch(format!("invalid integer: {s}")))
    }
}

fn json_to_u256(value: &serde_json::Value) -> ChainResult<U256> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| mismatch(format!("expected unsigned integer, got {n}"))),
        serde_json::Value::String(s) => parse_u256_str(s),
        other => Err(mismatch(format!("expected integer, got {other}"))),
    }
}

fn json_to_int(value: &serde_json::Value, bits: usize) -> ChainResult<U256> {
    let (negative, magnitude) = match value {
        serde_json::Value::Number(n) => {
            let v = n
                .as_i64()
                .ok_or_else(|| mismatch(format!("expected integer, got {n}")))?;
            (v < 0, U256::from(v.unsigned_abs()))
        }
        serde_json::Value::String(s) => match s.trim().strip_prefix('-') {
            Some(rest) => (true, parse_u256_str(rest)?),
            None => (false, parse_u256_str(s)?),
        },
        other => return Err(mismatch(format!("expected integer, got {other}"))),
    };

    let limit = U256::one() << (bits - 1);
    let in_range = if negative {
        magnitude <= limit
    } else {
        magnitude < limit
    };
    if !in_range {
        return Err(mismatch(format!("value out of range for int{bits}")));
    }

    if negative && !magnitude.is_zero() {
        Ok((!magnitude).overflowing_add(U256::one()).0)
    } else {
        Ok(magnitude)
    }
}

fn json_to_bytes(value: &serde_json::Value) -> ChainResult<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| mismatch(format!("expected hex string, got {value}")))?;
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(body).map_err(|e| mismatch(format!("invalid hex bytes: {e}")))
}

fn word_from_u256(v: U256) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    v.to_big_endian(&mut word);
    word
}

fn encode_value(ty: &ParamType, value: &AbiValue) -> ChainResult<Vec<u8>> {
    match (ty, value) {
        (ParamType::Uint(_), AbiValue::Uint(v)) | (ParamType::Int(_), AbiValue::Int(v)) => {
            Ok(word_from_u256(*v).to_vec())
        }
        (ParamType::Bool, AbiValue::Bool(b)) => Ok(word_from_u256(U256::from(u8::from(*b))).to_vec()),
        (ParamType::Address, AbiValue::Address(a)) => {
            let raw = hex::decode(a.trim_start_matches("0x"))
                .map_err(|e| mismatch(format!("invalid address: {e}")))?;
            let mut word = vec![0u8; WORD - raw.len()];
            word.extend_from_slice(&raw);
            Ok(word)
        }
        (ParamType::FixedBytes(_), AbiValue::FixedBytes(b)) => {
            let mut word = b.clone();
            word.resize(WORD, 0);
            Ok(word)
        }
        (ParamType::Bytes, AbiValue::Bytes(b)) => Ok(encode_dynamic_bytes(b)),
        (ParamType::String, AbiValue::String(s)) => Ok(encode_dynamic_bytes(s.as_bytes())),
        (ParamType::Array(inner), AbiValue::Array(items)) => {
            let mut out = word_from_u256(U256::from(items.len() as u64)).to_vec();
            let types = vec![(**inner).clone(); items.len()];
            out.extend(encode_tuple(&types, items)?);
            Ok(out)
        }
        (ParamType::FixedArray(inner, _), AbiValue::Array(items)) => {
            let types = vec![(**inner).clone(); items.len()];
            encode_tuple(&types, items)
        }
        (ty, value) => Err(mismatch(format!(
            "value {:?} does not match type {}",
            value,
            ty.canonical()
        ))),
    }
}

fn encode_dynamic_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = word_from_u256(U256::from(data.len() as u64)).to_vec();
    out.extend_from_slice(data);
    let padded = data.len().div_ceil(WORD) * WORD;
    out.resize(WORD + padded, 0);
    out
}

fn encode_tuple(types: &[ParamType], values: &[AbiValue]) -> ChainResult<Vec<u8>> {
    let head_len = types.iter().try_fold(0usize, |acc, ty| {
        acc.checked_add(ty.head_size()?)
            .ok_or_else(|| mismatch("argument list is too large"))
    })?;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for (ty, value) in types.iter().zip(values) {
        let encoded = encode_value(ty, value)?;
        if ty.is_dynamic() {
            head.extend_from_slice(&word_from_u256(U256::from((head_len + tail.len()) as u64)));
            tail.extend(encoded);
        } else {
            head.extend(encoded);
        }
    }

    head.extend(tail);
    Ok(head)
}

fn read_word(data: &[u8], pos: usize) -> ChainResult<&[u8]> {
    data.get(pos..pos + WORD)
        .ok_or_else(|| mismatch(format!("return data too short at offset {pos}")))
}

fn read_usize(data: &[u8], pos: usize) -> ChainResult<usize> {
    let word = U256::from_big_endian(read_word(data, pos)?);
    if word > U256::from(data.len() as u64) {
        return Err(mismatch(format!("offset or length {word} out of bounds")));
    }
    Ok(word.as_usize())
}

/// `count` elements of `elem` must fit in the data after `pos`.
fn ensure_fits(count: usize, elem: &ParamType, data: &[u8], pos: usize) -> ChainResult<()> {
    let needed = count.checked_mul(elem.head_size()?);
    let remaining = data.len().saturating_sub(pos);
    match needed {
        Some(needed) if needed <= remaining => Ok(()),
        _ => Err(mismatch(format!(
            "{count} x {} exceeds return data",
            elem.canonical()
        ))),
    }
}

fn decode_value(ty: &ParamType, data: &[u8], pos: usize) -> ChainResult<AbiValue> {
    match ty {
        ParamType::Uint(_) => Ok(AbiValue::Uint(U256::from_big_endian(read_word(data, pos)?))),
        ParamType::Int(_) => Ok(AbiValue::Int(U256::from_big_endian(read_word(data, pos)?))),
        ParamType::Bool => Ok(AbiValue::Bool(
            !U256::from_big_endian(read_word(data, pos)?).is_zero(),
        )),
        ParamType::Address => {
            let word = read_word(data, pos)?;
            Ok(AbiValue::Address(format!("0x{}", hex::encode(&word[12..]))))
        }
        ParamType::FixedBytes(n) => Ok(AbiValue::FixedBytes(read_word(data, pos)?[..*n].to_vec())),
        ParamType::Bytes | ParamType::String => {
            let len = read_usize(data, pos)?;
            let start = pos + WORD;
            let bytes = data
                .get(start..start + len)
                .ok_or_else(|| mismatch("dynamic value exceeds return data"))?
                .to_vec();
            if *ty == ParamType::String {
                String::from_utf8(bytes)
                    .map(AbiValue::String)
                    .map_err(|_| mismatch("string output is not valid UTF-8"))
            } else {
                Ok(AbiValue::Bytes(bytes))
            }
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, pos)?;
            ensure_fits(len, inner, data, pos + WORD)?;
            let types = vec![(**inner).clone(); len];
            decode_tuple(&types, data, pos + WORD).map(AbiValue::Array)
        }
        ParamType::FixedArray(inner, len) => {
            ensure_fits(*len, inner, data, pos)?;
            let types = vec![(**inner).clone(); *len];
            decode_tuple(&types, data, pos).map(AbiValue::Array)
        }
    }
}

fn decode_tuple(types: &[ParamType], data: &[u8], base: usize) -> ChainResult<Vec<AbiValue>> {
    let mut cursor = base;
    let mut values = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, cursor)?;
            values.push(decode_value(ty, data, base + offset)?);
            cursor += WORD;
        } else {
            values.push(decode_value(ty, data, cursor)?);
            cursor += ty.head_size()?;
        }
    }
    Ok(values)
}

/// A callable function resolved from an ABI fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<ParamType>,
    pub outputs: Vec<ParamType>,
}

impl AbiFunction {
    /// Resolve `name` in `abi`, choosing the overload whose arity matches.
    pub fn resolve(abi: &[serde_json::Value], name: &str, arg_count: usize) -> ChainResult<Self> {
        let mut saw_name = false;
        for entry in abi {
            let item: AbiItem = match serde_json::from_value(entry.clone()) {
                Ok(item) => item,
                Err(_) => continue,
            };
            if item.item_type != "function" || item.name.as_deref() != Some(name) {
                continue;
            }
            saw_name = true;
            if item.inputs.len() != arg_count {
                continue;
            }
            return Ok(Self {
                name: name.to_string(),
                inputs: parse_params(&item.inputs)?,
                outputs: parse_params(&item.outputs)?,
            });
        }

        if saw_name {
            Err(mismatch(format!(
                "no overload of {name} takes {arg_count} arguments"
            )))
        } else {
            Err(mismatch(format!("function {name} not found in ABI")))
        }
    }

    /// `name(type1,type2,...)`
    pub fn signature(&self) -> String {
        let args: Vec<String> = self.inputs.iter().map(ParamType::canonical).collect();
        format!("{}({})", self.name, args.join(","))
    }

    /// First four bytes of keccak256(signature).
    pub fn selector(&self) -> [u8; 4] {
        let hash = Keccak256::digest(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Calldata for `args`.
    pub fn encode_call(&self, args: &[serde_json::Value]) -> ChainResult<Vec<u8>> {
        if args.len() != self.inputs.len() {
            return Err(mismatch(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.inputs.len(),
                args.len()
            )));
        }
        let values = self
            .inputs
            .iter()
            .zip(args)
            .map(|(ty, arg)| AbiValue::from_json(ty, arg))
            .collect::<ChainResult<Vec<_>>>()?;

        let mut calldata = self.selector().to_vec();
        calldata.extend(encode_tuple(&self.inputs, &values)?);
        Ok(calldata)
    }

    /// Decode return data into one value per declared output.
    pub fn decode_output_values(&self, data: &[u8]) -> ChainResult<Vec<AbiValue>> {
        if self.outputs.is_empty() {
            return Ok(Vec::new());
        }
        if data.is_empty() {
            return Err(ChainError::Contract(format!(
                "{} returned no data (reverted or not a contract)",
                self.name
            )));
        }
        decode_tuple(&self.outputs, data, 0)
    }

    /// Decode return data to JSON: bare value for one output, array otherwise.
    pub fn decode_output(&self, data: &[u8]) -> ChainResult<serde_json::Value> {
        let mut values = self.decode_output_values(data)?;
        Ok(match values.len() {
            0 => serde_json::Value::Null,
            1 => values.remove(0).to_json(),
            _ => serde_json::Value::Array(values.iter().map(AbiValue::to_json).collect()),
        })
    }
}

fn parse_params(params: &[AbiParam]) -> ChainResult<Vec<ParamType>> {
    params.iter().map(|p| ParamType::parse(&p.kind)).collect()
}

/// ERC-20 `balanceOf(address) -> uint256` fragment.
pub fn erc20_balance_of_abi() -> Vec<serde_json::Value> {
    vec![serde_json::json!({
        "constant": true,
        "inputs": [{"name": "_owner", "type": "address"}],
        "name": "balanceOf",
        "outputs": [{"name": "balance", "type": "uint256"}],
        "type": "function"
    })]
}
