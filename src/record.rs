//! Record Assembler
//!
//! Turns each transaction envelope into exactly one output record. Every
//! per-transaction failure is captured as a `Failure` record; nothing escapes
//! this boundary, so one corrupt message never stops the batch.
//!
//! In JSON, `valueInBaseUnit` and `decoded.gas` are decimal strings (`"5"`,
//! `"2.5"`, `"1000000000"`) so that amounts stay exact for any consumer.

use std::io::Write;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::decoder::{declared_opcode, interpret_message, DecodedReferral, InterpretError};
use crate::indexer::TransactionEnvelope;
use crate::opcode::opcode_name;

/// Reasons a transaction produced a `Failure` record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Transaction has no in-message")]
    MissingInMessage,

    #[error("Malformed in-message: {0}")]
    MalformedInMessage(String),

    #[error(transparent)]
    Interpret(#[from] InterpretError),
}

/// Fully decoded referral report for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessRecord {
    pub tx_hash: String,
    pub source_address_bounceable: String,
    pub source_address_non_bounceable: String,
    pub destination_address: String,
    pub opcode: u32,
    /// Amount in TON, exact; serialized as a normalized decimal string
    pub value_in_base_unit: Decimal,
    #[serde(rename = "createdAtISO8601")]
    pub created_at_iso8601: String,
    /// Name of the decoded op when it is a known opcode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_name: Option<String>,
    pub decoded: DecodedReferral,
}

/// A transaction that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub tx_hash: String,
    /// Declared opcode, when it was read before the failing step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcode: Option<u32>,
    pub error_message: String,
}

/// One report entry per input transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutputRecord {
    Success(SuccessRecord),
    Failure(FailureRecord),
}

impl OutputRecord {
    pub fn tx_hash(&self) -> &str {
        match self {
            OutputRecord::Success(r) => &r.tx_hash,
            OutputRecord::Failure(r) => &r.tx_hash,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutputRecord::Success(_))
    }

    /// Declared opcode, if known
    pub fn opcode(&self) -> Option<u32> {
        match self {
            OutputRecord::Success(r) => Some(r.opcode),
            OutputRecord::Failure(r) => r.opcode,
        }
    }
}

fn failure(tx_hash: String, opcode: Option<u32>, error: RecordError) -> OutputRecord {
    warn!("Failed to decode transaction {}: {}", tx_hash, error);
    OutputRecord::Failure(FailureRecord {
        tx_hash,
        opcode,
        error_message: error.to_string(),
    })
}

/// Assemble the record for one transaction
pub fn assemble_record(envelope: &TransactionEnvelope) -> OutputRecord {
    let tx_hash = envelope.hash_hex();

    let msg = match envelope.in_message.as_ref() {
        Some(Ok(msg)) => msg,
        Some(Err(reason)) => {
            return failure(tx_hash, None, RecordError::MalformedInMessage(reason.clone()))
        }
        None => return failure(tx_hash, None, RecordError::MissingInMessage),
    };

    let opcode = match declared_opcode(msg) {
        Ok(opcode) => opcode,
        Err(e) => return failure(tx_hash, None, e.into()),
    };

    match interpret_message(msg, opcode) {
        Ok(interpreted) => OutputRecord::Success(SuccessRecord {
            tx_hash,
            source_address_bounceable: interpreted.source_bounceable,
            source_address_non_bounceable: interpreted.source_non_bounceable,
            destination_address: interpreted.destination,
            opcode,
            value_in_base_unit: interpreted.value,
            created_at_iso8601: interpreted.created_at,
            op_name: opcode_name(interpreted.decoded.op).map(str::to_string),
            decoded: interpreted.decoded,
        }),
        Err(e) => failure(tx_hash, Some(opcode), e.into()),
    }
}

/// Assemble records for a batch, preserving order
pub fn assemble_records(envelopes: &[TransactionEnvelope]) -> Vec<OutputRecord> {
    envelopes.iter().map(assemble_record).collect()
}

/// Write records as a JSON array
pub fn write_json<W: Write>(
    records: &[OutputRecord],
    writer: W,
    pretty: bool,
) -> Result<(), serde_json::Error> {
    if pretty {
        serde_json::to_writer_pretty(writer, records)
    } else {
        serde_json::to_writer(writer, records)
    }
}
