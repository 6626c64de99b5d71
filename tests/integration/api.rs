use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hl_exporter::api::{ApiConfig, ApiError, SummaryCache, SummarySource, ValidatorApiClient, ValidatorSummary};
use hl_exporter::identity::{truncate, IdentityResolver};
use hl_exporter::monitor::{Poller, ValidatorApiPoller};
use hl_exporter::sink::{StakeTotals, ValidatorSnapshot};

use crate::common::*;

/// Summary source with a switchable failure mode
#[derive(Default)]
struct FakeSource {
    calls: AtomicU32,
    failing: AtomicBool,
    summaries: Vec<ValidatorSummary>,
}

impl FakeSource {
    fn with(summaries: Vec<ValidatorSummary>) -> Arc<Self> {
        Arc::new(Self {
            summaries,
            ..Default::default()
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SummarySource for FakeSource {
    async fn fetch_summaries(&self) -> Result<Vec<ValidatorSummary>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self.summaries.clone())
    }
}

fn summary(validator: &str, signer: &str, name: &str, stake: f64, jailed: bool, active: bool) -> ValidatorSummary {
    ValidatorSummary {
        validator: validator.to_string(),
        signer: signer.to_string(),
        name: name.to_string(),
        description: String::new(),
        n_recent_blocks: 10,
        stake,
        is_jailed: jailed,
        unjailable_after: None,
        is_active: active,
    }
}

fn summaries() -> Vec<ValidatorSummary> {
    vec![
        summary(VALIDATOR_A, SIGNER_A, "alpha", 1_000.0, false, true),
        summary(VALIDATOR_B, SIGNER_B, "beta", 250.0, true, false),
    ]
}

#[test]
fn test_summary_wire_format() {
    let raw = r#"[{
        "validator": "0xAA", "signer": "0xBB", "name": "node", "description": "d",
        "nRecentBlocks": 12, "stake": 100000, "isJailed": true,
        "unjailableAfter": 1750000000000, "isActive": false, "commission": "0.05"
    }]"#;
    let parsed: Vec<ValidatorSummary> = serde_json::from_str(raw).unwrap();
    assert_eq!(parsed[0].n_recent_blocks, 12);
    assert_eq!(parsed[0].stake, 100_000.0);
    assert!(parsed[0].is_jailed);
    assert_eq!(parsed[0].unjailable_after, Some(1_750_000_000_000));
}

#[test]
fn test_client_builds_info_url() {
    let client = ValidatorApiClient::new("https://api.example.org/", &ApiConfig::default()).unwrap();
    assert_eq!(client.info_url(), "https://api.example.org/info");
}

#[tokio::test]
async fn test_cache_serves_fresh_results() {
    let source = FakeSource::with(summaries());
    let cache = SummaryCache::new(source.clone(), Duration::from_secs(60));

    assert_eq!(cache.summaries(false).await.unwrap().len(), 2);
    assert_eq!(cache.summaries(false).await.unwrap().len(), 2);
    assert_eq!(source.calls(), 1);

    cache.summaries(true).await.unwrap();
    assert_eq!(source.calls(), 2);
    assert!(cache.age().is_some());
}

#[tokio::test]
async fn test_cache_falls_back_to_stale() {
    let source = FakeSource::with(summaries());
    let cache = SummaryCache::new(source.clone(), Duration::ZERO);

    cache.summaries(false).await.unwrap();
    source.fail(true);

    let stale = cache.summaries(false).await.unwrap();
    assert_eq!(stale.len(), 2);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_cache_without_data_propagates_error() {
    let source = FakeSource::with(summaries());
    source.fail(true);
    let cache = SummaryCache::new(source.clone(), Duration::from_secs(60));

    assert!(matches!(cache.summaries(false).await, Err(ApiError::Status { status: 502, .. })));
    assert!(cache.age().is_none());
}

#[tokio::test]
async fn test_api_poller_publishes_validator_set() {
    let source = FakeSource::with(summaries());
    let resolver = Arc::new(IdentityResolver::default());
    let sink = RecordingSink::new();
    let mut poller = ValidatorApiPoller::new(
        SummaryCache::new(source, Duration::from_secs(60)),
        resolver.clone(),
        sink.clone(),
    );

    poller.poll().await.unwrap();

    assert_eq!(
        sink.take(),
        vec![
            SinkCall::ValidatorSummary(
                labels_a(),
                ValidatorSnapshot {
                    stake: 1_000.0,
                    jailed: false,
                    active: true,
                }
            ),
            SinkCall::ValidatorSummary(
                labels_b(),
                ValidatorSnapshot {
                    stake: 250.0,
                    jailed: true,
                    active: false,
                }
            ),
            SinkCall::StakeTotals(StakeTotals {
                total: 1_250.0,
                jailed: 250.0,
                not_jailed: 1_000.0,
                active: 1_000.0,
                inactive: 250.0,
                validator_count: 2,
            }),
        ]
    );

    // mappings learned from the API resolve signers, truncated ones included
    assert_eq!(resolver.labels_for(SIGNER_B), labels_b());
    assert_eq!(resolver.labels_for(&truncate(SIGNER_A)), labels_a());
}

#[tokio::test]
async fn test_api_poller_error_without_cache() {
    let source = FakeSource::with(summaries());
    source.fail(true);
    let sink = RecordingSink::new();
    let mut poller = ValidatorApiPoller::new(
        SummaryCache::new(source, Duration::from_secs(60)),
        Arc::new(IdentityResolver::default()),
        sink.clone(),
    );

    assert!(poller.poll().await.is_err());
    assert!(sink.calls().is_empty());
}
