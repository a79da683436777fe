//! Pipeline Orchestrator
//!
//! For each configured address: fetch its history, assemble one record per
//! transaction, and append to a single output in delivery order. Runs strictly
//! sequentially; an indexer error aborts the whole run.

use tracing::info;

use crate::config::ScanConfig;
use crate::indexer::{fetch_all, throttle, IndexerError, TransactionSource};
use crate::record::{assemble_record, OutputRecord};

/// Per-address outcome counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSummary {
    pub address: String,
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Records of a run plus one summary per address
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub records: Vec<OutputRecord>,
    pub summaries: Vec<AddressSummary>,
}

/// Drives fetch -> decode -> assemble over every configured address
pub struct Pipeline<S> {
    source: S,
    config: ScanConfig,
}

impl<S: TransactionSource> Pipeline<S> {
    pub fn new(source: S, config: ScanConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the scan and return the flattened records
    pub async fn run(&self) -> Result<Vec<OutputRecord>, IndexerError> {
        Ok(self.run_with_summary().await?.records)
    }

    /// Run the scan and return records alongside per-address summaries
    pub async fn run_with_summary(&self) -> Result<ScanReport, IndexerError> {
        let paging = self.config.paging();
        let mut records = Vec::new();
        let mut summaries = Vec::with_capacity(self.config.addresses.len());

        for (i, address) in self.config.addresses.iter().enumerate() {
            if i > 0 {
                throttle(paging.request_delay).await;
            }

            let envelopes = fetch_all(&self.source, address, &paging).await?;
            let address_records: Vec<OutputRecord> = envelopes.iter().map(assemble_record).collect();

            let succeeded = address_records.iter().filter(|r| r.is_success()).count();
            let summary = AddressSummary {
                address: address.clone(),
                fetched: envelopes.len(),
                succeeded,
                failed: address_records.len() - succeeded,
            };
            info!(
                "Address {}: {} transactions, {} decoded, {} failed",
                summary.address, summary.fetched, summary.succeeded, summary.failed
            );

            summaries.push(summary);
            records.extend(address_records);
        }

        Ok(ScanReport { records, summaries })
    }
}
