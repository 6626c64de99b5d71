/*!
# Validator API

Client for the public `info` endpoint's `validatorSummaries` query, which lists
every validator with its signer, moniker, stake and jail/active status.

`SummaryCache` sits in front of any [`SummarySource`]: a result younger than the
freshness window is served without a request, and when a refresh fails after
its retries the last good result is served instead. Only when nothing was ever
fetched does the error reach the caller.
*/

pub mod error;
pub mod retry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use error::ApiError;
pub use retry::{with_retry, RetryConfig, RetryPolicy};

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Per-request client timeout
    pub timeout_secs: u64,
    pub retry: RetryConfig,
    /// Age under which a cached result is served without a request
    pub cache_freshness_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retry: RetryConfig::default(),
            cache_freshness_secs: 60,
        }
    }
}

/// One validator as reported by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSummary {
    pub validator: String,
    pub signer: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub n_recent_blocks: u64,
    #[serde(default)]
    pub stake: f64,
    #[serde(default)]
    pub is_jailed: bool,
    #[serde(default)]
    pub unjailable_after: Option<i64>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Serialize)]
struct InfoRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

/// Anything that can produce the current validator summaries
#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn fetch_summaries(&self) -> Result<Vec<ValidatorSummary>, ApiError>;
}

/// HTTP client for the validator summaries endpoint
pub struct ValidatorApiClient {
    http: reqwest::Client,
    info_url: String,
    retry: RetryPolicy,
}

impl ValidatorApiClient {
    pub fn new(base_url: &str, config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            info_url: format!("{}/info", base_url.trim_end_matches('/')),
            retry: RetryPolicy::new(config.retry.clone()),
        })
    }

    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    async fn fetch_once(&self) -> Result<Vec<ValidatorSummary>, ApiError> {
        let response = self
            .http
            .post(&self.info_url)
            .json(&InfoRequest {
                kind: "validatorSummaries",
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SummarySource for ValidatorApiClient {
    async fn fetch_summaries(&self) -> Result<Vec<ValidatorSummary>, ApiError> {
        with_retry(&self.retry, || self.fetch_once()).await
    }
}

struct CachedSummaries {
    fetched_at: Instant,
    summaries: Arc<Vec<ValidatorSummary>>,
}

/// Freshness-bounded cache with stale fallback over a [`SummarySource`]
pub struct SummaryCache {
    source: Arc<dyn SummarySource>,
    freshness: Duration,
    cached: RwLock<Option<CachedSummaries>>,
}

impl SummaryCache {
    pub fn new(source: Arc<dyn SummarySource>, freshness: Duration) -> Self {
        Self {
            source,
            freshness,
            cached: RwLock::new(None),
        }
    }

    /// Current summaries, refreshed when stale or when `force_refresh` is set
    pub async fn summaries(&self, force_refresh: bool) -> Result<Arc<Vec<ValidatorSummary>>, ApiError> {
        let cached = self
            .cached
            .read()
            .as_ref()
            .filter(|c| !c.summaries.is_empty())
            .map(|c| (c.fetched_at.elapsed(), c.summaries.clone()));

        if let Some((age, summaries)) = &cached {
            if !force_refresh && *age < self.freshness {
                debug!(?age, "using cached validator summaries");
                return Ok(summaries.clone());
            }
        }

        match self.source.fetch_summaries().await {
            Ok(summaries) => {
                let summaries = Arc::new(summaries);
                *self.cached.write() = Some(CachedSummaries {
                    fetched_at: Instant::now(),
                    summaries: summaries.clone(),
                });
                Ok(summaries)
            }
            Err(e) => match cached {
                Some((age, summaries)) => {
                    warn!(error = %e, ?age, "validator summaries refresh failed, using stale cache");
                    Ok(summaries)
                }
                None => Err(e),
            },
        }
    }

    /// Age of the cached result, if any
    pub fn age(&self) -> Option<Duration> {
        self.cached.read().as_ref().map(|c| c.fetched_at.elapsed())
    }
}
