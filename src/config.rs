//! Scan Configuration
//!
//! Everything the pipeline needs from its environment: which indexer to query,
//! which account histories to scan, and how hard to page through them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// toncenter v3 index on testnet
pub const TESTNET_URL: &str = "https://testnet.toncenter.com/api/v3";

/// toncenter v3 index on mainnet
pub const MAINNET_URL: &str = "https://toncenter.com/api/v3";

/// Records requested per page
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Offset ceiling; paging stops once the offset reaches it
pub const DEFAULT_TOTAL_CAP: usize = 10;

/// Minimum pause between indexer requests
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;

/// HTTP client timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Errors that can occur while building a configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown network: {0} (expected \"testnet\" or \"mainnet\")")]
    UnknownNetwork(String),

    #[error("Base URL cannot be empty")]
    EmptyBaseUrl,

    #[error("At least one address must be configured")]
    NoAddresses,

    #[error("Page size must be greater than zero")]
    ZeroPageSize,
}

/// Network whose index is queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    /// Returns the indexer base URL for this network
    pub fn base_url(&self) -> &'static str {
        match self {
            Network::Testnet => TESTNET_URL,
            Network::Mainnet => MAINNET_URL,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Testnet => write!(f, "testnet"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Paging parameters handed to the indexer pager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    /// Records requested per page
    pub page_size: usize,
    /// Offset ceiling (bounds the offset, not the number of records)
    pub total_cap: usize,
    /// Pause inserted between consecutive requests
    pub request_delay: Duration,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            total_cap: DEFAULT_TOTAL_CAP,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
        }
    }
}

/// Configuration for a scan run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Indexer base URL, e.g. `https://toncenter.com/api/v3`
    pub base_url: String,
    /// Account addresses whose histories are scanned, in order
    pub addresses: Vec<String>,
    /// Records requested per page
    pub page_size: usize,
    /// Offset ceiling
    pub total_cap: usize,
    /// Pause between indexer requests
    pub request_delay: Duration,
    /// Optional toncenter API key, sent as `X-API-Key`
    pub api_key: Option<String>,
    /// HTTP client timeout
    pub timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::for_network(Network::default())
    }
}

impl ScanConfig {
    /// Create a config pointed at the given network's index
    pub fn for_network(network: Network) -> Self {
        Self {
            base_url: network.base_url().to_string(),
            addresses: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            total_cap: DEFAULT_TOTAL_CAP,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            api_key: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Replace the address list
    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Paging parameters derived from this config
    pub fn paging(&self) -> PagingConfig {
        PagingConfig {
            page_size: self.page_size,
            total_cap: self.total_cap,
            request_delay: self.request_delay,
        }
    }

    /// Check that the config can drive a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        if self.addresses.iter().all(|a| a.trim().is_empty()) {
            return Err(ConfigError::NoAddresses);
        }
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(())
    }
}
