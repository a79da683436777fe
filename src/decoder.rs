//! Message Interpreter
//!
//! Decodes the referral record carried in an in-message body and derives the
//! display fields of a report: canonical addresses, the amount in TON and an
//! ISO-8601 timestamp.
//!
//! Body layout: `uint32 op | uint64 query_id | coins gas | bytes referrer`.

use chrono::{DateTime, SecondsFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::address::{AddressFormatError, TonAddress};
use crate::cell::{cell_from_base64, Cell, DecodeError};
use crate::indexer::{InMessage, NumericField};

/// Nanotons in one TON
pub const NANOTONS_PER_TON: u64 = 1_000_000_000;

/// Decimal places of the TON display unit
pub const TON_DECIMALS: u32 = 9;

/// Errors that can occur while interpreting a single in-message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Failed to decode message body: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid address: {0}")]
    Address(#[from] AddressFormatError),

    #[error("Amount {0} nanotons exceeds the representable range")]
    AmountOverflow(u128),
}

/// Coins amounts as decimal strings; 15-byte coins exceed JSON's safe integers
mod coins_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Referral record decoded from a message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedReferral {
    pub op: u32,
    pub query_id: u64,
    /// Gas amount in nanotons, serialized as a decimal string
    #[serde(with = "coins_string")]
    pub gas: u128,
    pub referrer: String,
}

/// Every field derived from one in-message
#[derive(Debug, Clone, PartialEq)]
pub struct InterpretedMessage {
    pub source_bounceable: String,
    pub source_non_bounceable: String,
    pub destination: String,
    pub opcode: u32,
    pub value: Decimal,
    pub created_at: String,
    pub decoded: DecodedReferral,
}

/// Read the referral fields from a cell, in layout order
pub fn decode_referral(cell: &Cell) -> Result<DecodedReferral, DecodeError> {
    let mut slice = cell.begin_parse();
    let op = slice.read_u32()?;
    let query_id = slice.read_u64()?;
    let gas = slice.read_coins()?;
    let referrer = slice.read_string()?;

    Ok(DecodedReferral {
        op,
        query_id,
        gas,
        referrer,
    })
}

/// Decode a base64 bag-of-cells body into a referral record
pub fn decode_referral_body(body: &str) -> Result<DecodedReferral, DecodeError> {
    let cell = cell_from_base64(body)?;
    decode_referral(&cell)
}

/// Exact nanoton to TON conversion
pub fn nanotons_to_ton(nanotons: u128) -> Result<Decimal, InterpretError> {
    let mantissa = i128::try_from(nanotons).map_err(|_| InterpretError::AmountOverflow(nanotons))?;
    Decimal::try_from_i128_with_scale(mantissa, TON_DECIMALS)
        .map(|d| d.normalize())
        .map_err(|_| InterpretError::AmountOverflow(nanotons))
}

/// Render a unix timestamp as ISO-8601 UTC with an explicit `+00:00` offset
pub fn unix_to_iso8601(seconds: i64) -> Result<String, InterpretError> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false))
        .ok_or_else(|| InterpretError::InvalidField {
            field: "created_at",
            reason: format!("timestamp {} out of range", seconds),
        })
}

/// The opcode declared in the message metadata
pub fn declared_opcode(msg: &InMessage) -> Result<u32, InterpretError> {
    let field = msg
        .opcode
        .as_ref()
        .ok_or(InterpretError::MissingField("opcode"))?;
    field.as_opcode().ok_or_else(|| invalid("opcode", field))
}

fn invalid(field: &'static str, value: &NumericField) -> InterpretError {
    InterpretError::InvalidField {
        field,
        reason: format!("unexpected value {:?}", value),
    }
}

fn required_str<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, InterpretError> {
    value
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(InterpretError::MissingField(field))
}

/// Interpret an in-message whose declared opcode is already known
///
/// Fields are derived in order: body, source, destination, value, created_at.
/// The first failure is returned.
pub fn interpret_message(msg: &InMessage, opcode: u32) -> Result<InterpretedMessage, InterpretError> {
    let body = msg.body().ok_or(InterpretError::MissingField("message_content.body"))?;
    let decoded = decode_referral_body(body)?;
    if decoded.op != opcode {
        debug!(
            "Decoded op {:#010x} differs from declared opcode {:#010x}",
            decoded.op, opcode
        );
    }

    let source = TonAddress::parse(required_str(&msg.source, "source")?)?;
    let destination = TonAddress::parse(required_str(&msg.destination, "destination")?)?;

    let value_field = msg.value.as_ref().ok_or(InterpretError::MissingField("value"))?;
    let nanotons = value_field.as_u128().ok_or_else(|| invalid("value", value_field))?;
    let value = nanotons_to_ton(nanotons)?;

    let created_field = msg
        .created_at
        .as_ref()
        .ok_or(InterpretError::MissingField("created_at"))?;
    let seconds = created_field
        .as_i64()
        .ok_or_else(|| invalid("created_at", created_field))?;
    let created_at = unix_to_iso8601(seconds)?;

    Ok(InterpretedMessage {
        source_bounceable: source.to_bounceable(),
        source_non_bounceable: source.to_non_bounceable(),
        destination: destination.to_bounceable(),
        opcode,
        value,
        created_at,
        decoded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{serialize_boc_base64, CellBuilder};
    use crate::indexer::MessageContent;

    const RAW: &str = "0:0705A90393F13BA8B94D419C490ECAA3FEBBB2005A6A6ABC3CE6D3BE734DDF2B";
    const REFERRAL_BOC: &str = "te6cckEBAQEAGQAALQAAAAEAAAAAAAAAKkO5rKAGFiYzEyM4hUVrOw==";

    fn message(body: &str) -> InMessage {
        InMessage {
            source: Some(RAW.to_string()),
            destination: Some(RAW.to_string()),
            value: Some(NumericField::Text("5000000000".to_string())),
            created_at: Some(NumericField::Text("1700000000".to_string())),
            opcode: Some(NumericField::Text("0x00000001".to_string())),
            message_content: Some(MessageContent {
                body: Some(body.to_string()),
            }),
        }
    }

    fn body_with(build: impl FnOnce(&mut CellBuilder) -> Result<(), DecodeError>) -> String {
        let mut builder = CellBuilder::new();
        build(&mut builder).unwrap();
        serialize_boc_base64(&builder.build())
    }

    // ==================== DecodedReferral serde tests ====================

    #[test]
    fn test_gas_serializes_as_decimal_string() {
        let decoded = decode_referral_body(REFERRAL_BOC).unwrap();
        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json["gas"], "1000000000");
        assert_eq!(json["queryId"], 42);
    }

    #[test]
    fn test_gas_at_coins_bound_round_trips() {
        let decoded = DecodedReferral {
            op: 1,
            query_id: 42,
            gas: (1u128 << 120) - 1,
            referrer: "abc123".to_string(),
        };
        let json = serde_json::to_string(&decoded).unwrap();
        assert!(json.contains("\"gas\":\"1329227995784915872903807060280344575\""));
        let parsed: DecodedReferral = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, decoded);
    }

    #[test]
    fn test_gas_rejects_non_numeric_string() {
        let json = r#"{"op":1,"queryId":0,"gas":"lots","referrer":""}"#;
        assert!(serde_json::from_str::<DecodedReferral>(json).is_err());
    }

    // ==================== decode_referral tests ====================

    #[test]
    fn test_decode_referral_body() {
        let decoded = decode_referral_body(REFERRAL_BOC).unwrap();
        assert_eq!(
            decoded,
            DecodedReferral {
                op: 1,
                query_id: 42,
                gas: 1_000_000_000,
                referrer: "abc123".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_referral_misaligned_tail() {
        let body = body_with(|b| {
            b.store_uint(1, 32)?;
            b.store_uint(42, 64)?;
            b.store_coins(0)?;
            b.store_uint(0b10101, 5)?;
            Ok(())
        });
        assert_eq!(decode_referral_body(&body), Err(DecodeError::Misaligned(5)));
    }

    #[test]
    fn test_decode_referral_utf8_referrer() {
        let body = body_with(|b| {
            b.store_uint(0x7bcd1fef, 32)?;
            b.store_uint(0, 64)?;
            b.store_coins(0)?;
            b.store_bytes("réf-✓".as_bytes())?;
            Ok(())
        });
        assert_eq!(decode_referral_body(&body).unwrap().referrer, "réf-✓");
    }

    #[test]
    fn test_decode_referral_truncated_query_id() {
        let body = body_with(|b| {
            b.store_uint(1, 32)?;
            b.store_uint(42, 32)?;
            Ok(())
        });
        assert!(matches!(
            decode_referral_body(&body),
            Err(DecodeError::NotEnoughBits { requested: 64, .. })
        ));
    }

    // ==================== conversion tests ====================

    #[test]
    fn test_nanotons_to_ton_exact() {
        assert_eq!(nanotons_to_ton(5_000_000_000).unwrap(), Decimal::from(5));
        assert_eq!(nanotons_to_ton(1).unwrap(), Decimal::new(1, 9));
        assert_eq!(nanotons_to_ton(0).unwrap(), Decimal::ZERO);
        assert_eq!(nanotons_to_ton(1_500_000_000).unwrap().to_string(), "1.5");
    }

    #[test]
    fn test_nanotons_round_trip() {
        for nanotons in [0u128, 1, 999_999_999, 5_000_000_000, u64::MAX as u128] {
            let ton = nanotons_to_ton(nanotons).unwrap();
            let back = ton * Decimal::from(NANOTONS_PER_TON);
            assert_eq!(back, Decimal::from_i128_with_scale(nanotons as i128, 0), "{}", nanotons);
        }
    }

    #[test]
    fn test_nanotons_overflow() {
        assert_eq!(nanotons_to_ton(u128::MAX), Err(InterpretError::AmountOverflow(u128::MAX)));
    }

    #[test]
    fn test_unix_to_iso8601() {
        assert_eq!(unix_to_iso8601(1700000000).unwrap(), "2023-11-14T22:13:20+00:00");
        assert_eq!(unix_to_iso8601(0).unwrap(), "1970-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_unix_to_iso8601_out_of_range() {
        assert!(matches!(
            unix_to_iso8601(i64::MAX),
            Err(InterpretError::InvalidField { field: "created_at", .. })
        ));
    }

    // ==================== declared_opcode tests ====================

    #[test]
    fn test_declared_opcode() {
        assert_eq!(declared_opcode(&message(REFERRAL_BOC)).unwrap(), 1);
    }

    #[test]
    fn test_declared_opcode_missing() {
        let msg = InMessage {
            opcode: None,
            ..message(REFERRAL_BOC)
        };
        assert_eq!(declared_opcode(&msg), Err(InterpretError::MissingField("opcode")));
    }

    #[test]
    fn test_declared_opcode_invalid() {
        let msg = InMessage {
            opcode: Some(NumericField::Text("deposit".to_string())),
            ..message(REFERRAL_BOC)
        };
        assert!(matches!(
            declared_opcode(&msg),
            Err(InterpretError::InvalidField { field: "opcode", .. })
        ));
    }

    // ==================== interpret_message tests ====================

    #[test]
    fn test_interpret_message() {
        let interpreted = interpret_message(&message(REFERRAL_BOC), 1).unwrap();
        assert_eq!(interpreted.source_bounceable, "EQAHBakDk_E7qLlNQZxJDsqj_ruyAFpqarw85tO-c03fK9UP");
        assert_eq!(
            interpreted.source_non_bounceable,
            "UQAHBakDk_E7qLlNQZxJDsqj_ruyAFpqarw85tO-c03fK4jK"
        );
        assert_eq!(interpreted.destination, "EQAHBakDk_E7qLlNQZxJDsqj_ruyAFpqarw85tO-c03fK9UP");
        assert_eq!(interpreted.value, Decimal::from(5));
        assert_eq!(interpreted.created_at, "2023-11-14T22:13:20+00:00");
        assert_eq!(interpreted.decoded.referrer, "abc123");
    }

    #[test]
    fn test_interpret_message_missing_body() {
        let msg = InMessage {
            message_content: None,
            ..message(REFERRAL_BOC)
        };
        assert_eq!(
            interpret_message(&msg, 1),
            Err(InterpretError::MissingField("message_content.body"))
        );
    }

    #[test]
    fn test_interpret_message_bad_source() {
        let msg = InMessage {
            source: Some("0:1234".to_string()),
            ..message(REFERRAL_BOC)
        };
        assert!(matches!(interpret_message(&msg, 1), Err(InterpretError::Address(_))));
    }

    #[test]
    fn test_interpret_message_missing_destination() {
        let msg = InMessage {
            destination: None,
            ..message(REFERRAL_BOC)
        };
        assert_eq!(
            interpret_message(&msg, 1),
            Err(InterpretError::MissingField("destination"))
        );
    }

    #[test]
    fn test_interpret_message_negative_value() {
        let msg = InMessage {
            value: Some(NumericField::Signed(-1)),
            ..message(REFERRAL_BOC)
        };
        assert!(matches!(
            interpret_message(&msg, 1),
            Err(InterpretError::InvalidField { field: "value", .. })
        ));
    }

    #[test]
    fn test_interpret_message_body_error_wins_over_address_error() {
        let msg = InMessage {
            source: None,
            ..message("te6cckEBAQEAAgAAAEysuc0=")
        };
        assert!(matches!(interpret_message(&msg, 1), Err(InterpretError::Decode(_))));
    }

    #[test]
    fn test_interpret_error_display() {
        let err = InterpretError::from(DecodeError::Misaligned(5));
        assert!(err.to_string().contains("not byte-aligned"));
        assert!(InterpretError::MissingField("value").to_string().contains("value"));
    }
}
