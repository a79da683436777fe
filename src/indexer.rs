//! Indexer Client
//!
//! Pages through an account's transaction history on a toncenter v3 style
//! index (`GET {base}/transactions?account=..&limit=..&offset=..&sort=desc`).
//! Any transport failure or non-2xx status is fatal and is returned as-is;
//! there is no retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::cell::decode_base64;
use crate::config::{PagingConfig, ScanConfig};

/// Header carrying the toncenter API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Indexer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed indexer response: {0}")]
    MalformedResponse(String),

    #[error("Invalid transaction hash {hash:?}: {reason}")]
    InvalidHash { hash: String, reason: String },
}

/// Integer-valued field as the indexer may send it: number or string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Unsigned(u64),
    Signed(i64),
    Text(String),
    Other(serde_json::Value),
}

impl NumericField {
    /// Non-negative integer; strings may be decimal or `0x` hex
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            NumericField::Unsigned(v) => Some(u128::from(*v)),
            NumericField::Signed(v) => u128::try_from(*v).ok(),
            NumericField::Text(s) => parse_unsigned_text(s),
            NumericField::Other(_) => None,
        }
    }

    /// Signed integer; strings may be decimal or `0x` hex
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumericField::Unsigned(v) => i64::try_from(*v).ok(),
            NumericField::Signed(v) => Some(*v),
            NumericField::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| parse_unsigned_text(s).and_then(|v| i64::try_from(v).ok()))
            }
            NumericField::Other(_) => None,
        }
    }

    /// 32-bit opcode; negative values are taken as two's complement
    pub fn as_opcode(&self) -> Option<u32> {
        let value = match self {
            NumericField::Text(s) if is_hex(s) => return parse_unsigned_text(s)?.try_into().ok(),
            other => other.as_i64()?,
        };
        if value < 0 {
            i32::try_from(value).ok().map(|v| v as u32)
        } else {
            u32::try_from(value).ok()
        }
    }
}

fn is_hex(s: &str) -> bool {
    let s = s.trim();
    s.starts_with("0x") || s.starts_with("0X")
}

fn parse_unsigned_text(s: &str) -> Option<u128> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16).ok(),
        None => s.parse::<u128>().ok(),
    }
}

/// `message_content` object of an in-message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Base64 bag-of-cells payload
    #[serde(default)]
    pub body: Option<String>,
}

/// Inbound message as delivered by the indexer
///
/// Every field is optional on the wire; the message interpreter decides which
/// ones are required and reports the missing ones per record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InMessage {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    /// Amount in nanotons
    #[serde(default)]
    pub value: Option<NumericField>,
    /// Unix timestamp, seconds
    #[serde(default)]
    pub created_at: Option<NumericField>,
    #[serde(default)]
    pub opcode: Option<NumericField>,
    #[serde(default)]
    pub message_content: Option<MessageContent>,
}

impl InMessage {
    /// The base64 body, if present
    pub fn body(&self) -> Option<&str> {
        self.message_content.as_ref()?.body.as_deref()
    }
}

/// Transaction object as delivered by the indexer
///
/// `in_msg` stays untyped here so that a wrongly shaped in-message only
/// fails its own record instead of the whole page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Base64 transaction hash
    pub hash: String,
    #[serde(default)]
    pub in_msg: Option<serde_json::Value>,
}

/// Response body of `GET /transactions`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub transactions: Option<Vec<RawTransaction>>,
}

impl TransactionPage {
    /// Convert the page into envelopes, decoding every hash
    pub fn into_envelopes(self) -> Result<Vec<TransactionEnvelope>, IndexerError> {
        self.transactions
            .unwrap_or_default()
            .into_iter()
            .map(TransactionEnvelope::from_raw)
            .collect()
    }
}

/// One transaction handed to the record assembler
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEnvelope {
    /// Decoded hash bytes (never empty)
    pub hash: Vec<u8>,
    /// Inbound message; absent for e.g. outgoing-only transactions, `Err`
    /// with the shape error when present but not an in-message object
    pub in_message: Option<Result<InMessage, String>>,
}

impl TransactionEnvelope {
    pub fn new(hash: Vec<u8>, in_message: Option<InMessage>) -> Self {
        Self {
            hash,
            in_message: in_message.map(Ok),
        }
    }

    /// Envelope whose in-message was present but could not be read
    pub fn with_malformed_in_message(hash: Vec<u8>, reason: impl Into<String>) -> Self {
        Self {
            hash,
            in_message: Some(Err(reason.into())),
        }
    }

    /// The in-message, when present and well-formed
    pub fn message(&self) -> Option<&InMessage> {
        self.in_message.as_ref()?.as_ref().ok()
    }

    /// Decode the wire hash; an undecodable or empty hash is a malformed response
    pub fn from_raw(raw: RawTransaction) -> Result<Self, IndexerError> {
        let hash = decode_base64(&raw.hash).map_err(|e| IndexerError::InvalidHash {
            hash: raw.hash.clone(),
            reason: e.to_string(),
        })?;
        if hash.is_empty() {
            return Err(IndexerError::InvalidHash {
                hash: raw.hash,
                reason: "empty".to_string(),
            });
        }
        let in_message = raw
            .in_msg
            .map(|value| InMessage::deserialize(value).map_err(|e| e.to_string()));
        Ok(Self { hash, in_message })
    }

    /// Lowercase hex transaction hash
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }
}

/// Source of transaction pages
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Fetch one page of an account's history, newest first
    async fn fetch_page(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionEnvelope>, IndexerError>;
}

/// HTTP client for a toncenter v3 index
#[derive(Debug, Clone)]
pub struct IndexerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl IndexerClient {
    /// Create a client from the scan configuration
    pub fn new(config: &ScanConfig) -> Result<Self, IndexerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IndexerError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Create a client for a base URL with default settings
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, IndexerError> {
        let config = ScanConfig {
            base_url: base_url.into(),
            ..Default::default()
        };
        Self::new(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/transactions`, tolerating a trailing slash on the base
    pub fn transactions_url(&self) -> String {
        format!("{}/transactions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TransactionSource for IndexerClient {
    async fn fetch_page(
        &self,
        address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionEnvelope>, IndexerError> {
        debug!("Fetching {} transactions for {} at offset {}", limit, address, offset);

        let query = [
            ("account", address.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("sort", "desc".to_string()),
        ];
        let mut request = self.client.get(self.transactions_url()).query(&query);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let page: TransactionPage = response
            .json()
            .await
            .map_err(|e| IndexerError::MalformedResponse(e.to_string()))?;
        page.into_envelopes()
    }
}

/// Sleep for `delay` unless it is zero
pub async fn throttle(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

/// Page through an account's history until a page comes back empty or the
/// offset reaches `total_cap`
///
/// The offset advances by the number of records each page returned. No
/// request is ever issued with `offset >= total_cap`; `request_delay` is
/// inserted between consecutive requests.
pub async fn fetch_all<S>(
    source: &S,
    address: &str,
    paging: &PagingConfig,
) -> Result<Vec<TransactionEnvelope>, IndexerError>
where
    S: TransactionSource + ?Sized,
{
    info!("Fetching transactions for {}", address);

    let mut offset = 0;
    let mut all = Vec::new();
    while offset < paging.total_cap {
        if offset > 0 {
            throttle(paging.request_delay).await;
        }

        let page = source.fetch_page(address, paging.page_size, offset).await?;
        if page.is_empty() {
            break;
        }

        debug!("Page at offset {} returned {} transactions", offset, page.len());
        offset += page.len();
        all.extend(page);
    }

    info!("For {} fetched {} transactions", address, all.len());
    Ok(all)
}
