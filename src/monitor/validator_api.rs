//! Validator set, stakes and jail status from the remote API.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::Poller;
use crate::api::{SummaryCache, ValidatorSummary};
use crate::identity::{normalize, IdentityResolver, ValidatorLabels};
use crate::sink::{MetricsSink, StakeTotals, ValidatorSnapshot};
use crate::Result;

/// Sum stakes over `summaries`, split by jail and active status
pub fn stake_totals(summaries: &[ValidatorSummary]) -> StakeTotals {
    summaries.iter().fold(
        StakeTotals {
            validator_count: summaries.len(),
            ..StakeTotals::default()
        },
        |mut totals, summary| {
            totals.total += summary.stake;
            if summary.is_jailed {
                totals.jailed += summary.stake;
            } else {
                totals.not_jailed += summary.stake;
            }
            if summary.is_active {
                totals.active += summary.stake;
            } else {
                totals.inactive += summary.stake;
            }
            totals
        },
    )
}

/// Feed one summary into the resolver
pub fn register_summary(summary: &ValidatorSummary, resolver: &IdentityResolver) {
    resolver.register_full_address(&summary.validator);
    resolver.register_full_address(&summary.signer);
    resolver.register_signer_mapping(&summary.signer, &summary.validator);
    resolver.register_validator_info(&summary.validator, &summary.signer, &summary.name);
}

/// Periodically publishes the validator set from [`SummaryCache`]
pub struct ValidatorApiPoller {
    summaries: SummaryCache,
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MetricsSink>,
}

impl ValidatorApiPoller {
    pub fn new(summaries: SummaryCache, resolver: Arc<IdentityResolver>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            summaries,
            resolver,
            sink,
        }
    }
}

#[async_trait]
impl Poller for ValidatorApiPoller {
    fn name(&self) -> &'static str {
        "validator_api"
    }

    async fn poll(&mut self) -> Result<()> {
        let summaries = self.summaries.summaries(false).await?;

        for summary in summaries.iter() {
            register_summary(summary, &self.resolver);

            let labels = ValidatorLabels {
                validator: normalize(&summary.validator),
                signer: normalize(&summary.signer),
                name: summary.name.clone(),
            };
            self.sink.set_validator_summary(
                &labels,
                &ValidatorSnapshot {
                    stake: summary.stake,
                    jailed: summary.is_jailed,
                    active: summary.is_active,
                },
            );
            if summary.is_jailed {
                debug!(
                    validator = %labels.validator,
                    name = %labels.name,
                    unjailable_after = ?summary.unjailable_after,
                    "validator jailed"
                );
            }
        }

        let totals = stake_totals(&summaries);
        self.sink.set_stake_totals(&totals);
        info!(
            validators = totals.validator_count,
            total = totals.total,
            jailed = totals.jailed,
            not_jailed = totals.not_jailed,
            active = totals.active,
            inactive = totals.inactive,
            "updated validator summaries"
        );
        Ok(())
    }
}
