//! Gateway configuration with validation.
//!
//! Loaded from an optional TOML file, then environment overrides, then CLI
//! flags (the latter applied by the binary).

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `chain.rpc_url`
pub const ENV_RPC_URL: &str = "GATEWAY_RPC_URL";
/// Environment variable overriding `chain.chain_id`
pub const ENV_CHAIN_ID: &str = "GATEWAY_CHAIN_ID";
/// Environment variable overriding `http.port`
pub const ENV_HTTP_PORT: &str = "GATEWAY_HTTP_PORT";

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub http: HttpConfig,
    /// Upstream chain endpoint
    pub chain: ChainConfig,
    /// Block and transaction cache capacities
    pub cache: CacheConfig,
    /// WebSocket watcher settings
    pub subscriptions: SubscriptionConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Request limits
    pub limits: LimitsConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// API response behaviour
    pub api: ApiConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.chain.rpc_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidRpcUrl("rpc_url cannot be empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidRpcUrl(format!(
                "rpc_url must be http(s): {url}"
            )));
        }

        if self.cache.max_blocks == 0 || self.cache.max_transactions == 0 {
            return Err(ConfigError::InvalidLimit(
                "cache capacities cannot be 0".into(),
            ));
        }

        let intervals = [
            ("subscriptions.block_interval", self.subscriptions.block_interval),
            ("subscriptions.gas_interval", self.subscriptions.gas_interval),
            ("subscriptions.upstream_timeout", self.subscriptions.upstream_timeout),
            ("timeouts.request", self.timeouts.request),
            ("timeouts.rpc", self.timeouts.rpc),
            ("timeouts.receipt_wait", self.timeouts.receipt_wait),
            ("timeouts.receipt_poll_interval", self.timeouts.receipt_poll_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::InvalidTimeout(format!("{name} cannot be 0")));
        }

        if self.subscriptions.max_subscribers == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_subscribers cannot be 0".into(),
            ));
        }
        if self.limits.max_latest_blocks == 0
            || self.limits.max_raw_tx_size == 0
            || self.limits.stats_window == 0
        {
            return Err(ConfigError::InvalidLimit(
                "request limits cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Apply `GATEWAY_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL) {
            self.chain.rpc_url = url;
        }
        if let Some(raw) = lookup(ENV_CHAIN_ID) {
            self.chain.chain_id = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_CHAIN_ID}={raw}")))?;
        }
        if let Some(raw) = lookup(ENV_HTTP_PORT) {
            self.http.port = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_HTTP_PORT}={raw}")))?;
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8000)
    pub port: u16,
    /// Enable HTTP server
    pub enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8000,
            enabled: true,
        }
    }
}

/// Upstream chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the node
    pub rpc_url: String,
    /// Chain ID
    pub chain_id: u64,
    /// Network name
    pub network_name: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://bsc-dataseed.binance.org/".to_string(),
            chain_id: 56,
            network_name: "bsc".to_string(),
        }
    }
}

/// Cache capacities (entries, LRU eviction)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_blocks: usize,
    pub max_transactions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_blocks: 10_000,
            max_transactions: 50_000,
        }
    }
}

/// WebSocket watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Block watcher tick
    #[serde(with = "humantime_serde")]
    pub block_interval: Duration,
    /// Gas watcher tick
    #[serde(with = "humantime_serde")]
    pub gas_interval: Duration,
    /// Upper bound on one upstream fetch inside a tick
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,
    /// Concurrent WebSocket subscribers across all topics
    pub max_subscribers: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_secs(3),
            gas_interval: Duration::from_secs(10),
            upstream_timeout: Duration::from_secs(10),
            max_subscribers: 1024,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout for REST handlers
    #[serde(with = "humantime_serde")]
    pub request: Duration,
    /// Per upstream HTTP call
    #[serde(with = "humantime_serde")]
    pub rpc: Duration,
    /// How long a receipt lookup waits for inclusion
    #[serde(with = "humantime_serde")]
    pub receipt_wait: Duration,
    /// Receipt polling period
    #[serde(with = "humantime_serde")]
    pub receipt_poll_interval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            rpc: Duration::from_secs(15),
            receipt_wait: Duration::from_secs(60),
            receipt_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max `count` accepted by `/api/blocks/latest/{count}`
    pub max_latest_blocks: u64,
    /// Max decoded size of a raw transaction in bytes (default: 128KB)
    pub max_raw_tx_size: usize,
    /// Number of recent blocks used for average block time
    pub stats_window: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_latest_blocks: 100,
            max_raw_tx_size: 128 * 1024,
            stats_window: 10,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache, seconds
    pub max_age: u64,
    /// Allow credentials
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec!["GET".to_string(), "POST".to_string(), "OPTIONS".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            max_age: 86400,
            allow_credentials: false,
        }
    }
}

/// API response behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Report every failure as HTTP 500 instead of a differentiated status
    pub legacy_error_status: bool,
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config: {0}")]
    Io(String),
    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(String),
    /// Bad upstream endpoint
    #[error("invalid rpc url: {0}")]
    InvalidRpcUrl(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout or interval value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration as `"3s"`, `"500ms"`, `"1m"` or a bare number of seconds
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before 's' and 'm'
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
