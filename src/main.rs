use std::io::{self, Write};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ton_referral_scanner::config::{
    Network, ScanConfig, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_DELAY_MS, DEFAULT_TIMEOUT_MS,
    DEFAULT_TOTAL_CAP,
};
use ton_referral_scanner::{write_json, IndexerClient, Pipeline};

/// Scan TON account histories for referral-tagged in-messages and print a JSON report
#[derive(Parser, Debug)]
#[command(name = "ton-referral-scan", version)]
struct Args {
    /// Network whose toncenter index is queried
    #[arg(long, default_value_t = Network::Testnet)]
    network: Network,

    /// Override the indexer base URL
    #[arg(long, env = "TONCENTER_BASE_URL")]
    base_url: Option<String>,

    /// Account address to scan (repeat or comma-separate for several)
    #[arg(long = "address", env = "TON_SCAN_ADDRESSES", value_delimiter = ',', required = true)]
    addresses: Vec<String>,

    /// Records requested per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Offset ceiling per address
    #[arg(long, default_value_t = DEFAULT_TOTAL_CAP)]
    total_cap: usize,

    /// Pause between indexer requests, in milliseconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_DELAY_MS)]
    delay_ms: u64,

    /// HTTP timeout, in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// toncenter API key
    #[arg(long, env = "TONCENTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Print the report on a single line
    #[arg(long)]
    compact: bool,
}

impl Args {
    fn into_config(self) -> ScanConfig {
        let mut config = ScanConfig::for_network(self.network).with_addresses(self.addresses);
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        config.page_size = self.page_size;
        config.total_cap = self.total_cap;
        config.request_delay = Duration::from_millis(self.delay_ms);
        config.timeout = Duration::from_millis(self.timeout_ms);
        config.api_key = self.api_key;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let pretty = !args.compact;
    let config = args.into_config();
    config.validate().context("invalid configuration")?;

    info!(
        "Scanning {} address(es) on {}",
        config.addresses.len(),
        config.base_url
    );

    let client = IndexerClient::new(&config).context("failed to build indexer client")?;
    let pipeline = Pipeline::new(client, config);
    let report = pipeline.run_with_summary().await.context("indexer request failed")?;

    let failed: usize = report.summaries.iter().map(|s| s.failed).sum();
    info!("Decoded {} records ({} failed)", report.records.len(), failed);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_json(&report.records, &mut out, pretty).context("failed to write report")?;
    writeln!(out)?;
    Ok(())
}
