/*!
# Metrics Sink

The narrow output contract of the exporter: one setter per derived quantity.
Workers resolve identities before calling in, so every per-validator setter
receives the final [`ValidatorLabels`]; the sink only registers and exposes.

[`PrometheusSink`] is the production implementation.
*/

pub mod prometheus;

use serde::{Deserialize, Serialize};

use crate::config::LogFamily;
use crate::identity::ValidatorLabels;

pub use self::prometheus::PrometheusSink;

/// Which heartbeat health figure a status line reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeartbeatStatusKind {
    SinceLastSuccess,
    LastAckDuration,
}

impl HeartbeatStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatStatusKind::SinceLastSuccess => "since_last_success",
            HeartbeatStatusKind::LastAckDuration => "last_ack_duration",
        }
    }
}

/// Which block-time log a measurement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockState {
    Fast,
    Slow,
    /// Single `block_times` directory of nodes without the fast/slow split
    Legacy,
}

impl BlockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockState::Fast => "fast",
            BlockState::Slow => "slow",
            BlockState::Legacy => "legacy",
        }
    }

    /// Height and block time gauges follow this state only
    pub fn reports_height(&self) -> bool {
        matches!(self, BlockState::Fast | BlockState::Legacy)
    }
}

/// Aggregates over all validator summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StakeTotals {
    pub total: f64,
    pub jailed: f64,
    pub not_jailed: f64,
    pub active: f64,
    pub inactive: f64,
    pub validator_count: usize,
}

/// Per-validator figures from one validator summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    pub stake: f64,
    pub jailed: bool,
    pub active: bool,
}

/// Output side of every worker
pub trait MetricsSink: Send + Sync {
    // votes and blocks
    fn set_vote_round(&self, validator: &ValidatorLabels, round: u64);
    fn set_vote_time_delta(&self, validator: &ValidatorLabels, seconds: f64);
    fn set_current_round(&self, round: u64);
    fn set_rounds_per_block(&self, rounds: u64);
    fn increment_proposer(&self, proposer: &ValidatorLabels);

    // quorum and timeout certificates
    fn increment_qc_signatures(&self, signer: &ValidatorLabels);
    fn set_qc_participation_rate(&self, signer: &ValidatorLabels, rate: f64);
    fn observe_qc_size(&self, size: usize);
    fn increment_tc_participation(&self, voter: &ValidatorLabels);
    fn increment_tc_blocks(&self, proposer: &ValidatorLabels);
    fn observe_tc_size(&self, size: usize);
    fn increment_timeout_rounds(&self, suspect: &ValidatorLabels);

    // heartbeats and connectivity
    fn increment_heartbeats_sent(&self, validator: &ValidatorLabels);
    fn increment_heartbeat_acks(&self, from: &ValidatorLabels, to: &ValidatorLabels);
    /// Unlabeled, aggregated over every validator pair
    fn observe_heartbeat_delay(&self, delay_ms: f64);
    fn set_heartbeat_status(&self, validator: &ValidatorLabels, kind: HeartbeatStatusKind, value: f64);
    fn set_connectivity(&self, validator: &ValidatorLabels, peer: &ValidatorLabels, value: f64);
    fn remove_connectivity(&self, validator: &ValidatorLabels, peer: &ValidatorLabels);

    // validator set
    fn set_validator_summary(&self, validator: &ValidatorLabels, snapshot: &ValidatorSnapshot);
    fn set_stake_totals(&self, totals: &StakeTotals);
    fn set_is_validator(&self, is_validator: bool);
    /// Empty when the node is not a validator
    fn set_validator_address(&self, address: &str);

    // latency and peers
    fn set_validator_latency(&self, validator: &ValidatorLabels, latency: f64, round: u64);
    fn set_validator_latency_ema(&self, validator: &ValidatorLabels, ema: f64);
    fn set_peer_counts(&self, verified: u64, unverified: u64);

    // applied blocks
    fn set_block_height(&self, height: u64);
    fn set_latest_block_time(&self, unix_secs: i64);
    fn observe_block_time(&self, state: BlockState, millis: f64);
    fn observe_apply_duration(&self, state: BlockState, millis: f64);

    // exporter health
    fn record_monitor_line(&self, family: LogFamily, parsed: bool);
    fn set_cache_entries(&self, cache: &'static str, entries: usize);
}
