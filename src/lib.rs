//! TON Referral Scanner Library
//!
//! This crate pages through account transaction histories on a toncenter
//! index, decodes the referral record carried in each in-message body, and
//! produces one success or failure record per transaction.

pub mod address;
pub mod cell;
pub mod config;
pub mod decoder;
pub mod indexer;
pub mod opcode;
pub mod pipeline;
pub mod record;

// Re-export commonly used types
pub use address::{AddressFormatError, TonAddress};
pub use cell::{cell_from_base64, Cell, CellSlice, DecodeError};
pub use config::{Network, PagingConfig, ScanConfig};
pub use decoder::{decode_referral, DecodedReferral, InterpretError};
pub use indexer::{fetch_all, IndexerClient, IndexerError, TransactionEnvelope, TransactionSource};
pub use pipeline::{AddressSummary, Pipeline, ScanReport};
pub use record::{assemble_record, write_json, OutputRecord};
