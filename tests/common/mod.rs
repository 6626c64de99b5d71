#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::json;

use hl_exporter::config::LogFamily;
use hl_exporter::identity::{IdentityConfig, IdentityResolver, ValidatorLabels};
use hl_exporter::sink::{BlockState, HeartbeatStatusKind, MetricsSink, StakeTotals, ValidatorSnapshot};

pub const VALIDATOR_A: &str = "0x5ac99df645f3414876c816caa18b2d234024b487";
pub const SIGNER_A: &str = "0x1111111111111111111111111111111111111111";
pub const VALIDATOR_B: &str = "0xef22f260eec3b7d1edebe53359f5ca584c18d5ac";
pub const SIGNER_B: &str = "0x2222222222222222222222222222222222222222";

/// Every sink call, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    VoteRound(ValidatorLabels, u64),
    VoteTimeDelta(ValidatorLabels, f64),
    CurrentRound(u64),
    RoundsPerBlock(u64),
    Proposer(ValidatorLabels),
    QcSignature(ValidatorLabels),
    QcParticipation(ValidatorLabels, f64),
    QcSize(usize),
    TcParticipation(ValidatorLabels),
    TcBlock(ValidatorLabels),
    TcSize(usize),
    TimeoutRound(ValidatorLabels),
    HeartbeatSent(ValidatorLabels),
    HeartbeatAck(ValidatorLabels, ValidatorLabels),
    HeartbeatDelay(f64),
    HeartbeatStatus(ValidatorLabels, HeartbeatStatusKind, f64),
    Connectivity(ValidatorLabels, ValidatorLabels, f64),
    RemoveConnectivity(ValidatorLabels, ValidatorLabels),
    ValidatorSummary(ValidatorLabels, ValidatorSnapshot),
    StakeTotals(StakeTotals),
    IsValidator(bool),
    ValidatorAddress(String),
    Latency(ValidatorLabels, f64, u64),
    LatencyEma(ValidatorLabels, f64),
    PeerCounts(u64, u64),
    BlockHeight(u64),
    LatestBlockTime(i64),
    BlockTime(BlockState, f64),
    ApplyDuration(BlockState, f64),
    MonitorLine(LogFamily, bool),
    CacheEntries(&'static str, usize),
}

/// Sink that records calls instead of exporting them
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn take(&self) -> Vec<SinkCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn count(&self, matches: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }

    fn push(&self, call: SinkCall) {
        self.calls.lock().push(call);
    }
}

impl MetricsSink for RecordingSink {
    fn set_vote_round(&self, validator: &ValidatorLabels, round: u64) {
        self.push(SinkCall::VoteRound(validator.clone(), round));
    }

    fn set_vote_time_delta(&self, validator: &ValidatorLabels, seconds: f64) {
        self.push(SinkCall::VoteTimeDelta(validator.clone(), seconds));
    }

    fn set_current_round(&self, round: u64) {
        self.push(SinkCall::CurrentRound(round));
    }

    fn set_rounds_per_block(&self, rounds: u64) {
        self.push(SinkCall::RoundsPerBlock(rounds));
    }

    fn increment_proposer(&self, proposer: &ValidatorLabels) {
        self.push(SinkCall::Proposer(proposer.clone()));
    }

    fn increment_qc_signatures(&self, signer: &ValidatorLabels) {
        self.push(SinkCall::QcSignature(signer.clone()));
    }

    fn set_qc_participation_rate(&self, signer: &ValidatorLabels, rate: f64) {
        self.push(SinkCall::QcParticipation(signer.clone(), rate));
    }

    fn observe_qc_size(&self, size: usize) {
        self.push(SinkCall::QcSize(size));
    }

    fn increment_tc_participation(&self, voter: &ValidatorLabels) {
        self.push(SinkCall::TcParticipation(voter.clone()));
    }

    fn increment_tc_blocks(&self, proposer: &ValidatorLabels) {
        self.push(SinkCall::TcBlock(proposer.clone()));
    }

    fn observe_tc_size(&self, size: usize) {
        self.push(SinkCall::TcSize(size));
    }

    fn increment_timeout_rounds(&self, suspect: &ValidatorLabels) {
        self.push(SinkCall::TimeoutRound(suspect.clone()));
    }

    fn increment_heartbeats_sent(&self, validator: &ValidatorLabels) {
        self.push(SinkCall::HeartbeatSent(validator.clone()));
    }

    fn increment_heartbeat_acks(&self, from: &ValidatorLabels, to: &ValidatorLabels) {
        self.push(SinkCall::HeartbeatAck(from.clone(), to.clone()));
    }

    fn observe_heartbeat_delay(&self, delay_ms: f64) {
        self.push(SinkCall::HeartbeatDelay(delay_ms));
    }

    fn set_heartbeat_status(&self, validator: &ValidatorLabels, kind: HeartbeatStatusKind, value: f64) {
        self.push(SinkCall::HeartbeatStatus(validator.clone(), kind, value));
    }

    fn set_connectivity(&self, validator: &ValidatorLabels, peer: &ValidatorLabels, value: f64) {
        self.push(SinkCall::Connectivity(validator.clone(), peer.clone(), value));
    }

    fn remove_connectivity(&self, validator: &ValidatorLabels, peer: &ValidatorLabels) {
        self.push(SinkCall::RemoveConnectivity(validator.clone(), peer.clone()));
    }

    fn set_validator_summary(&self, validator: &ValidatorLabels, snapshot: &ValidatorSnapshot) {
        self.push(SinkCall::ValidatorSummary(validator.clone(), snapshot.clone()));
    }

    fn set_stake_totals(&self, totals: &StakeTotals) {
        self.push(SinkCall::StakeTotals(totals.clone()));
    }

    fn set_is_validator(&self, is_validator: bool) {
        self.push(SinkCall::IsValidator(is_validator));
    }

    fn set_validator_address(&self, address: &str) {
        self.push(SinkCall::ValidatorAddress(address.to_string()));
    }

    fn set_validator_latency(&self, validator: &ValidatorLabels, latency: f64, round: u64) {
        self.push(SinkCall::Latency(validator.clone(), latency, round));
    }

    fn set_validator_latency_ema(&self, validator: &ValidatorLabels, ema: f64) {
        self.push(SinkCall::LatencyEma(validator.clone(), ema));
    }

    fn set_peer_counts(&self, verified: u64, unverified: u64) {
        self.push(SinkCall::PeerCounts(verified, unverified));
    }

    fn set_block_height(&self, height: u64) {
        self.push(SinkCall::BlockHeight(height));
    }

    fn set_latest_block_time(&self, unix_secs: i64) {
        self.push(SinkCall::LatestBlockTime(unix_secs));
    }

    fn observe_block_time(&self, state: BlockState, millis: f64) {
        self.push(SinkCall::BlockTime(state, millis));
    }

    fn observe_apply_duration(&self, state: BlockState, millis: f64) {
        self.push(SinkCall::ApplyDuration(state, millis));
    }

    fn record_monitor_line(&self, family: LogFamily, parsed: bool) {
        self.push(SinkCall::MonitorLine(family, parsed));
    }

    fn set_cache_entries(&self, cache: &'static str, entries: usize) {
        self.push(SinkCall::CacheEntries(cache, entries));
    }
}

/// Resolver with no expiry, holding the A and B signer mappings
pub fn test_resolver() -> Arc<IdentityResolver> {
    let resolver = IdentityResolver::new(&IdentityConfig {
        capacity: 100,
        ttl_secs: 0,
        address_capacity: 100,
    });
    resolver.register_signer_mapping(SIGNER_A, VALIDATOR_A);
    resolver.register_validator_info(VALIDATOR_A, SIGNER_A, "alpha");
    resolver.register_signer_mapping(SIGNER_B, VALIDATOR_B);
    resolver.register_validator_info(VALIDATOR_B, SIGNER_B, "beta");
    resolver.register_full_address(VALIDATOR_A);
    resolver.register_full_address(VALIDATOR_B);
    Arc::new(resolver)
}

pub fn labels(validator: &str, signer: &str, name: &str) -> ValidatorLabels {
    ValidatorLabels {
        validator: validator.to_string(),
        signer: signer.to_string(),
        name: name.to_string(),
    }
}

pub fn labels_a() -> ValidatorLabels {
    labels(VALIDATOR_A, SIGNER_A, "alpha")
}

pub fn labels_b() -> ValidatorLabels {
    labels(VALIDATOR_B, SIGNER_B, "beta")
}

pub fn ts(secs: u32, millis: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, secs)
        .single()
        .map(|t| t + chrono::TimeDelta::milliseconds(millis as i64))
        .unwrap()
}

pub fn format_ts(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

pub fn vote_line(at: DateTime<Utc>, signer: &str, round: u64) -> String {
    json!([format_ts(at), ["in", {"Vote": {"round": round, "signer_id": signer}}]]).to_string()
}

pub fn block_line(at: DateTime<Utc>, round: u64, proposer: &str, qc: &[&str], tc: Option<&[&str]>) -> String {
    let mut block = json!({
        "round": round,
        "proposer": proposer,
        "qc": {"round": round.saturating_sub(1), "signers": qc},
    });
    if let Some(voters) = tc {
        let timeouts: Vec<_> = voters.iter().map(|v| json!({"validator": v, "round": round})).collect();
        block["tc"] = json!({"timeouts": timeouts});
    }
    json!([format_ts(at), ["in", {"source": proposer, "msg": {"Block": block}}]]).to_string()
}

pub fn heartbeat_line(at: DateTime<Utc>, validator: &str, random_id: u64) -> String {
    json!([format_ts(at), ["out", {"Heartbeat": {"validator": validator, "random_id": random_id}}]]).to_string()
}

pub fn ack_line(at: DateTime<Utc>, source: &str, random_id: u64) -> String {
    json!([format_ts(at), ["in", {"source": source, "msg": {"HeartbeatAck": {"random_id": random_id}}}]]).to_string()
}

/// Status line reporting `pairs` as disconnected
pub fn status_line(at: DateTime<Utc>, pairs: &[(&str, &str)]) -> String {
    let rows: Vec<_> = pairs
        .iter()
        .map(|(validator, peer)| json!([validator, [[peer, 100]]]))
        .collect();
    json!([format_ts(at), {"disconnected_validators": rows}]).to_string()
}

/// Status line naming the home signer and the stake table
pub fn stakes_line(at: DateTime<Utc>, home: Option<&str>, stakes: &[(&str, &str)]) -> String {
    let rows: Vec<_> = stakes
        .iter()
        .map(|(validator, signer)| json!([validator, signer, 1000]))
        .collect();
    json!([format_ts(at), {"home_validator": home, "current_stakes": rows}]).to_string()
}
