//! Account address canonicalization
//!
//! Parses raw (`workchain:hex`) and user-friendly (48-char base64) account
//! identifiers and renders them in the URL-safe user-friendly form, either
//! bounceable or non-bounceable.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use crc::{Crc, CRC_16_XMODEM};
use thiserror::Error;

/// Length of a user-friendly address in characters
pub const FRIENDLY_ADDRESS_LEN: usize = 48;

const BOUNCEABLE_TAG: u8 = 0x11;
const NON_BOUNCEABLE_TAG: u8 = 0x51;
const TEST_ONLY_FLAG: u8 = 0x80;

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Errors that can occur while parsing an address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("Address is empty")]
    Empty,

    #[error("Invalid workchain: {0}")]
    InvalidWorkchain(String),

    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("Invalid user-friendly address length: {0} (expected 48)")]
    InvalidLength(usize),

    #[error("Invalid base64 in address: {0}")]
    InvalidBase64(String),

    #[error("Unknown address tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("Address checksum mismatch")]
    ChecksumMismatch,
}

/// An account identifier: workchain plus 256-bit account id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TonAddress {
    workchain: i8,
    account_id: [u8; 32],
}

impl TonAddress {
    pub fn new(workchain: i8, account_id: [u8; 32]) -> Self {
        Self {
            workchain,
            account_id,
        }
    }

    pub fn workchain(&self) -> i8 {
        self.workchain
    }

    pub fn account_id(&self) -> &[u8; 32] {
        &self.account_id
    }

    /// Parse either the raw or the user-friendly form
    pub fn parse(input: &str) -> Result<Self, AddressFormatError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressFormatError::Empty);
        }
        if input.contains(':') {
            Self::parse_raw(input)
        } else {
            Self::parse_friendly(input)
        }
    }

    /// Parse `workchain:64-hex-digits`
    pub fn parse_raw(input: &str) -> Result<Self, AddressFormatError> {
        let (workchain, account) = input
            .split_once(':')
            .ok_or_else(|| AddressFormatError::InvalidWorkchain(input.to_string()))?;
        let workchain: i8 = workchain
            .parse()
            .map_err(|_| AddressFormatError::InvalidWorkchain(workchain.to_string()))?;

        let bytes = hex::decode(account)
            .map_err(|e| AddressFormatError::InvalidAccountId(e.to_string()))?;
        let account_id: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            AddressFormatError::InvalidAccountId(format!("{} bytes, expected 32", b.len()))
        })?;

        Ok(Self::new(workchain, account_id))
    }

    /// Parse a 48-character user-friendly address in either base64 alphabet
    pub fn parse_friendly(input: &str) -> Result<Self, AddressFormatError> {
        if input.len() != FRIENDLY_ADDRESS_LEN {
            return Err(AddressFormatError::InvalidLength(input.len()));
        }
        let bytes = URL_SAFE
            .decode(input)
            .or_else(|_| STANDARD.decode(input))
            .map_err(|e| AddressFormatError::InvalidBase64(e.to_string()))?;
        if bytes.len() != 36 {
            return Err(AddressFormatError::InvalidLength(input.len()));
        }

        let tag = bytes[0] & !TEST_ONLY_FLAG;
        if tag != BOUNCEABLE_TAG && tag != NON_BOUNCEABLE_TAG {
            return Err(AddressFormatError::UnknownTag(bytes[0]));
        }

        let stored = u16::from_be_bytes([bytes[34], bytes[35]]);
        if CRC16.checksum(&bytes[..34]) != stored {
            return Err(AddressFormatError::ChecksumMismatch);
        }

        let mut account_id = [0u8; 32];
        account_id.copy_from_slice(&bytes[2..34]);
        Ok(Self::new(bytes[1] as i8, account_id))
    }

    /// Raw form, lowercase hex: `0:0705a9...`
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.account_id))
    }

    /// URL-safe user-friendly form
    pub fn to_user_friendly(&self, bounceable: bool, test_only: bool) -> String {
        let mut tag = if bounceable {
            BOUNCEABLE_TAG
        } else {
            NON_BOUNCEABLE_TAG
        };
        if test_only {
            tag |= TEST_ONLY_FLAG;
        }

        let mut bytes = Vec::with_capacity(36);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.account_id);
        let crc = CRC16.checksum(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());

        URL_SAFE.encode(bytes)
    }

    pub fn to_bounceable(&self) -> String {
        self.to_user_friendly(true, false)
    }

    pub fn to_non_bounceable(&self) -> String {
        self.to_user_friendly(false, false)
    }
}

impl FromStr for TonAddress {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "0:0705a90393f13ba8b94d419c490ecaa3febbb2005a6a6abc3ce6d3be734ddf2b";
    const BOUNCEABLE: &str = "EQAHBakDk_E7qLlNQZxJDsqj_ruyAFpqarw85tO-c03fK9UP";
    const NON_BOUNCEABLE: &str = "UQAHBakDk_E7qLlNQZxJDsqj_ruyAFpqarw85tO-c03fK4jK";
    const TESTNET_BOUNCEABLE: &str = "kQAHBakDk_E7qLlNQZxJDsqj_ruyAFpqarw85tO-c03fK26F";

    // ==================== parse_raw tests ====================

    #[test]
    fn test_parse_raw_basechain() {
        let address = TonAddress::parse(RAW).unwrap();
        assert_eq!(address.workchain(), 0);
        assert_eq!(address.account_id()[0], 0x07);
        assert_eq!(address.to_raw(), RAW);
    }

    #[test]
    fn test_parse_raw_uppercase_hex() {
        let address = TonAddress::parse(&RAW.to_uppercase()).unwrap();
        assert_eq!(address.to_raw(), RAW);
    }

    #[test]
    fn test_parse_raw_masterchain() {
        let raw = format!("-1:{}", "00".repeat(32));
        let address = TonAddress::parse(&raw).unwrap();
        assert_eq!(address.workchain(), -1);
        assert_eq!(address.to_bounceable(), "Ef8AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAADAU");
        assert_eq!(address.to_non_bounceable(), "Uf8AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAG3R");
    }

    #[test]
    fn test_parse_raw_invalid_workchain() {
        let result = TonAddress::parse(&format!("x:{}", "00".repeat(32)));
        assert!(matches!(result, Err(AddressFormatError::InvalidWorkchain(_))));

        let result = TonAddress::parse(&format!("300:{}", "00".repeat(32)));
        assert!(matches!(result, Err(AddressFormatError::InvalidWorkchain(_))));
    }

    #[test]
    fn test_parse_raw_short_account_id() {
        let result = TonAddress::parse("0:abcd");
        assert!(matches!(result, Err(AddressFormatError::InvalidAccountId(_))));
    }

    #[test]
    fn test_parse_raw_non_hex_account_id() {
        let result = TonAddress::parse(&format!("0:{}", "zz".repeat(32)));
        assert!(matches!(result, Err(AddressFormatError::InvalidAccountId(_))));
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(TonAddress::parse("   "), Err(AddressFormatError::Empty));
    }

    // ==================== parse_friendly tests ====================

    #[test]
    fn test_parse_friendly_all_flavors_agree() {
        let raw = TonAddress::parse(RAW).unwrap();
        for friendly in [BOUNCEABLE, NON_BOUNCEABLE, TESTNET_BOUNCEABLE] {
            assert_eq!(TonAddress::parse(friendly).unwrap(), raw, "{}", friendly);
        }
    }

    #[test]
    fn test_parse_friendly_standard_alphabet() {
        let standard = BOUNCEABLE.replace('-', "+").replace('_', "/");
        assert_eq!(
            TonAddress::parse(&standard).unwrap(),
            TonAddress::parse(RAW).unwrap()
        );
    }

    #[test]
    fn test_parse_friendly_bad_checksum() {
        let mut corrupted = BOUNCEABLE.to_string();
        corrupted.replace_range(47..48, "A");
        assert_eq!(
            TonAddress::parse(&corrupted),
            Err(AddressFormatError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_parse_friendly_wrong_length() {
        assert_eq!(
            TonAddress::parse("EQAHBakD"),
            Err(AddressFormatError::InvalidLength(8))
        );
    }

    #[test]
    fn test_parse_friendly_bad_base64() {
        let result = TonAddress::parse(&"*".repeat(48));
        assert!(matches!(result, Err(AddressFormatError::InvalidBase64(_))));
    }

    #[test]
    fn test_parse_friendly_unknown_tag() {
        // 0x00 tag, zero workchain, zero account, arbitrary checksum
        let encoded = URL_SAFE.encode([0u8; 36]);
        assert_eq!(TonAddress::parse(&encoded), Err(AddressFormatError::UnknownTag(0)));
    }

    // ==================== to_user_friendly tests ====================

    #[test]
    fn test_to_bounceable() {
        let address = TonAddress::parse(RAW).unwrap();
        assert_eq!(address.to_bounceable(), BOUNCEABLE);
    }

    #[test]
    fn test_to_non_bounceable() {
        let address = TonAddress::parse(RAW).unwrap();
        assert_eq!(address.to_non_bounceable(), NON_BOUNCEABLE);
    }

    #[test]
    fn test_to_user_friendly_test_only() {
        let address = TonAddress::parse(RAW).unwrap();
        assert_eq!(address.to_user_friendly(true, true), TESTNET_BOUNCEABLE);
    }

    #[test]
    fn test_user_friendly_is_url_safe() {
        let address = TonAddress::parse(RAW).unwrap();
        for rendered in [address.to_bounceable(), address.to_non_bounceable()] {
            assert_eq!(rendered.len(), FRIENDLY_ADDRESS_LEN);
            assert!(!rendered.contains('+') && !rendered.contains('/') && !rendered.contains('='));
        }
    }

    #[test]
    fn test_display_is_raw() {
        let address: TonAddress = BOUNCEABLE.parse().unwrap();
        assert_eq!(address.to_string(), RAW);
    }
}
