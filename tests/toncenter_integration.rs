//! Toncenter Integration Tests
//!
//! These tests talk to the public testnet index at testnet.toncenter.com.
//! They are marked with #[ignore] by default for CI environments.
//!
//! To run these tests:
//! 1. Optionally export an API key: `export TONCENTER_API_KEY=...`
//! 2. Run tests: `cargo test --test toncenter_integration -- --ignored`

use std::time::Duration;

use ton_referral_scanner::config::{Network, ScanConfig};
use ton_referral_scanner::indexer::{fetch_all, IndexerClient, TransactionSource};
use ton_referral_scanner::pipeline::Pipeline;
use ton_referral_scanner::record::OutputRecord;

const TESTNET_ACCOUNT: &str = "kQAHBakDk_E7qLlNQZxJDsqj_ruyAFpqarw85tO-c03fK26F";

fn testnet_config() -> ScanConfig {
    ScanConfig {
        page_size: 5,
        total_cap: 10,
        request_delay: Duration::from_millis(1100),
        api_key: std::env::var("TONCENTER_API_KEY").ok(),
        ..ScanConfig::for_network(Network::Testnet).with_addresses([TESTNET_ACCOUNT])
    }
}

// ==================== Indexer Tests ====================

#[tokio::test]
#[ignore = "Requires network access to testnet.toncenter.com"]
async fn test_fetch_single_page() {
    let config = testnet_config();
    let client = IndexerClient::new(&config).unwrap();

    let page = client.fetch_page(TESTNET_ACCOUNT, 5, 0).await;
    assert!(page.is_ok(), "Failed to fetch page: {:?}", page.err());

    let page = page.unwrap();
    assert!(page.len() <= 5);
    for envelope in &page {
        assert_eq!(envelope.hash.len(), 32);
    }
}

#[tokio::test]
#[ignore = "Requires network access to testnet.toncenter.com"]
async fn test_fetch_all_respects_cap() {
    let config = testnet_config();
    let client = IndexerClient::new(&config).unwrap();

    let all = fetch_all(&client, TESTNET_ACCOUNT, &config.paging()).await.unwrap();
    // the cap bounds the offset, so the last page may overshoot by at most one page
    assert!(all.len() < config.total_cap + config.page_size);
}

// ==================== Pipeline Tests ====================

#[tokio::test]
#[ignore = "Requires network access to testnet.toncenter.com"]
async fn test_pipeline_against_testnet() {
    let config = testnet_config();
    let client = IndexerClient::new(&config).unwrap();
    let pipeline = Pipeline::new(client, config);

    let report = pipeline.run_with_summary().await.unwrap();

    assert_eq!(report.summaries.len(), 1);
    assert_eq!(report.summaries[0].fetched, report.records.len());
    for record in &report.records {
        assert_eq!(record.tx_hash().len(), 64);
        if let OutputRecord::Success(success) = record {
            assert!(success.created_at_iso8601.ends_with("+00:00"));
            assert_eq!(success.source_address_bounceable.len(), 48);
        }
    }
}
