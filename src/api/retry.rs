use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiError;

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// Fraction of the delay added or removed at random
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Exponential backoff with jitter for remote API calls
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Check if a failed attempt should be retried
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        attempt < self.config.max_attempts && error.is_retryable()
    }

    /// Delay before retry number `retry` (1 for the first retry)
    pub fn delay(&self, retry: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64;
        let max_delay = self.config.max_delay_ms as f64;
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff = (base_delay * self.config.backoff_factor.powi(exponent)).min(max_delay);

        let jitter_range = backoff * self.config.jitter_factor.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let delay = (backoff + jitter).clamp(0.0, max_delay);

        Duration::from_millis(delay as u64)
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "API call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if policy.should_retry(&e, attempt) => {
                let delay = policy.delay(attempt);
                debug!(attempt, ?delay, error = %e, "retrying API call");
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_retryable() => {
                return Err(ApiError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}
