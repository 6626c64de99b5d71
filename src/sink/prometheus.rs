//! [`MetricsSink`] on a `prometheus` registry, served over HTTP for scraping.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::{BlockState, HeartbeatStatusKind, MetricsSink, StakeTotals, ValidatorSnapshot};
use crate::config::LogFamily;
use crate::identity::ValidatorLabels;
use crate::{Error, Result};

pub const VOTE_ROUND: &str = "hl_consensus_vote_round";
pub const VOTE_TIME_DIFF: &str = "hl_consensus_vote_time_diff_seconds";
pub const CURRENT_ROUND: &str = "hl_consensus_current_round";
pub const ROUNDS_PER_BLOCK: &str = "hl_consensus_rounds_per_block";
pub const PROPOSER_COUNT: &str = "hl_proposer_count_total";
pub const QC_SIGNATURES: &str = "hl_consensus_qc_signatures_total";
pub const QC_PARTICIPATION: &str = "hl_consensus_qc_participation_rate";
pub const QC_SIZE: &str = "hl_consensus_qc_size";
pub const TC_PARTICIPATION: &str = "hl_consensus_tc_participation_total";
pub const TC_BLOCKS: &str = "hl_consensus_tc_blocks_total";
pub const TC_SIZE: &str = "hl_consensus_tc_size";
pub const TIMEOUT_ROUNDS: &str = "hl_timeout_rounds_total";
pub const HEARTBEATS_SENT: &str = "hl_consensus_heartbeats_sent_total";
pub const HEARTBEAT_ACKS: &str = "hl_consensus_heartbeat_acks_received_total";
pub const HEARTBEAT_DELAY: &str = "hl_consensus_heartbeat_ack_delay_ms";
pub const HEARTBEAT_STATUS: &str = "hl_consensus_heartbeat_status";
pub const CONNECTIVITY: &str = "hl_consensus_validator_connectivity";
pub const VALIDATOR_STAKE: &str = "hl_validator_stake";
pub const VALIDATOR_JAILED: &str = "hl_validator_jailed_status";
pub const VALIDATOR_ACTIVE: &str = "hl_validator_active_status";
pub const TOTAL_STAKE: &str = "hl_total_stake";
pub const JAILED_STAKE: &str = "hl_jailed_stake";
pub const NOT_JAILED_STAKE: &str = "hl_not_jailed_stake";
pub const ACTIVE_STAKE: &str = "hl_active_stake";
pub const INACTIVE_STAKE: &str = "hl_inactive_stake";
pub const VALIDATOR_COUNT: &str = "hl_validator_count";
pub const IS_VALIDATOR: &str = "hl_is_validator";
pub const VALIDATOR_ADDRESS: &str = "hl_validator_address";
pub const VALIDATOR_LATENCY: &str = "hl_consensus_validator_latency_seconds";
pub const VALIDATOR_LATENCY_ROUND: &str = "hl_consensus_validator_latency_round";
pub const VALIDATOR_LATENCY_EMA: &str = "hl_consensus_validator_latency_ema_seconds";
pub const PEER_CONNECTIONS: &str = "hl_p2p_non_val_peer_connections";
pub const PEERS_TOTAL: &str = "hl_p2p_non_val_peers_total";
pub const BLOCK_HEIGHT: &str = "hl_block_height";
pub const LATEST_BLOCK_TIME: &str = "hl_latest_block_time";
pub const BLOCK_TIME: &str = "hl_block_time_milliseconds";
pub const APPLY_DURATION: &str = "hl_apply_duration_milliseconds";
pub const APPLY_DURATION_LAST: &str = "hl_apply_duration";
pub const MONITOR_LINES: &str = "hl_consensus_monitor_lines_processed_total";
pub const MONITOR_ERRORS: &str = "hl_consensus_monitor_errors_total";
pub const MONITOR_LAST_PROCESSED: &str = "hl_consensus_monitor_last_processed";
pub const CACHE_ENTRIES: &str = "hl_exporter_cache_entries";

const VALIDATOR: &[&str] = &["validator", "signer", "name"];
const PAIR: &[&str] = &["validator", "peer", "validator_name", "peer_name"];
const ACK_PAIR: &[&str] = &["from_validator", "to_validator", "from_name", "to_name"];
const STATE_TYPE: &[&str] = &["state_type"];
const MONITOR_TYPE: &[&str] = &["monitor_type"];

const HEARTBEAT_DELAY_BUCKETS: &[f64] = &[
    10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0,
];
const CERT_SIZE_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 50.0, 75.0, 100.0];
const BLOCK_TIME_BUCKETS: &[f64] = &[
    10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 120.0, 140.0, 160.0, 180.0, 200.0,
    220.0, 240.0, 260.0, 280.0, 300.0, 350.0, 400.0, 450.0, 500.0, 600.0, 700.0, 800.0, 900.0,
    1_000.0, 1_500.0, 2_000.0,
];
const APPLY_DURATION_BUCKETS: &[f64] = &[
    0.1, 0.2, 0.5, 1.0, 2.0, 3.0, 5.0, 7.0, 10.0, 15.0, 20.0, 30.0, 50.0, 75.0, 100.0, 150.0, 200.0,
    250.0,
];

fn validator_values(labels: &ValidatorLabels) -> [&str; 3] {
    [&labels.validator, &labels.signer, &labels.name]
}

fn pair_values<'a>(validator: &'a ValidatorLabels, peer: &'a ValidatorLabels) -> [&'a str; 4] {
    [&validator.validator, &peer.validator, &validator.name, &peer.name]
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Every instrument the exporter reports, registered into one registry
struct Instruments {
    vote_round: GaugeVec,
    vote_time_diff: GaugeVec,
    current_round: Gauge,
    rounds_per_block: Gauge,
    proposer_count: CounterVec,
    qc_signatures: CounterVec,
    qc_participation: GaugeVec,
    qc_size: Histogram,
    tc_participation: CounterVec,
    tc_blocks: CounterVec,
    tc_size: Histogram,
    timeout_rounds: CounterVec,
    heartbeats_sent: CounterVec,
    heartbeat_acks: CounterVec,
    heartbeat_delay: Histogram,
    heartbeat_status: GaugeVec,
    connectivity: GaugeVec,
    validator_stake: GaugeVec,
    validator_jailed: GaugeVec,
    validator_active: GaugeVec,
    total_stake: Gauge,
    jailed_stake: Gauge,
    not_jailed_stake: Gauge,
    active_stake: Gauge,
    inactive_stake: Gauge,
    validator_count: Gauge,
    is_validator: Gauge,
    validator_address: GaugeVec,
    latency: GaugeVec,
    latency_round: GaugeVec,
    latency_ema: GaugeVec,
    peer_connections: GaugeVec,
    peers_total: Gauge,
    block_height: Gauge,
    latest_block_time: Gauge,
    block_time: HistogramVec,
    apply_duration: HistogramVec,
    apply_duration_last: GaugeVec,
    monitor_lines: CounterVec,
    monitor_errors: CounterVec,
    monitor_last_processed: GaugeVec,
    cache_entries: GaugeVec,
}

impl Instruments {
    fn new(registry: &Registry) -> prometheus::Result<Self> {
        let gauge = |name: &str, help: &str| -> prometheus::Result<Gauge> {
            let gauge = Gauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let gauge_vec = |name: &str, help: &str, labels: &[&str]| -> prometheus::Result<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };
        let counter_vec = |name: &str, help: &str, labels: &[&str]| -> prometheus::Result<CounterVec> {
            let vec = CounterVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };
        let histogram = |name: &str, help: &str, buckets: &[f64]| -> prometheus::Result<Histogram> {
            let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets.to_vec()))?;
            registry.register(Box::new(histogram.clone()))?;
            Ok(histogram)
        };
        let histogram_vec =
            |name: &str, help: &str, buckets: &[f64], labels: &[&str]| -> prometheus::Result<HistogramVec> {
                let vec = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets.to_vec()), labels)?;
                registry.register(Box::new(vec.clone()))?;
                Ok(vec)
            };

        Ok(Self {
            vote_round: gauge_vec(VOTE_ROUND, "Last round each validator voted in", VALIDATOR)?,
            vote_time_diff: gauge_vec(
                VOTE_TIME_DIFF,
                "Seconds between a vote's timestamp and its processing",
                VALIDATOR,
            )?,
            current_round: gauge(CURRENT_ROUND, "Round of the latest block")?,
            rounds_per_block: gauge(ROUNDS_PER_BLOCK, "Rounds elapsed between the last two blocks")?,
            proposer_count: counter_vec(PROPOSER_COUNT, "Blocks proposed per validator", VALIDATOR)?,
            qc_signatures: counter_vec(QC_SIGNATURES, "Quorum certificate signatures per validator", VALIDATOR)?,
            qc_participation: gauge_vec(
                QC_PARTICIPATION,
                "Percentage of recent quorum certificates signed",
                VALIDATOR,
            )?,
            qc_size: histogram(QC_SIZE, "Signers per quorum certificate", CERT_SIZE_BUCKETS)?,
            tc_participation: counter_vec(TC_PARTICIPATION, "Timeout certificate votes per validator", VALIDATOR)?,
            tc_blocks: counter_vec(TC_BLOCKS, "Blocks carrying a timeout certificate, by proposer", VALIDATOR)?,
            tc_size: histogram(TC_SIZE, "Votes per timeout certificate", CERT_SIZE_BUCKETS)?,
            timeout_rounds: counter_vec(TIMEOUT_ROUNDS, "Rounds advanced on timeout, by suspect", VALIDATOR)?,
            heartbeats_sent: counter_vec(HEARTBEATS_SENT, "Heartbeats sent per validator", VALIDATOR)?,
            heartbeat_acks: counter_vec(HEARTBEAT_ACKS, "Heartbeat acks received per validator pair", ACK_PAIR)?,
            heartbeat_delay: histogram(
                HEARTBEAT_DELAY,
                "Heartbeat round-trip delay in milliseconds",
                HEARTBEAT_DELAY_BUCKETS,
            )?,
            heartbeat_status: gauge_vec(
                HEARTBEAT_STATUS,
                "Heartbeat health reported by the node",
                &["validator", "signer", "name", "status_type"],
            )?,
            connectivity: gauge_vec(CONNECTIVITY, "Disconnected validator pairs, 0 while disconnected", PAIR)?,
            validator_stake: gauge_vec(VALIDATOR_STAKE, "Stake per validator", VALIDATOR)?,
            validator_jailed: gauge_vec(VALIDATOR_JAILED, "1 if the validator is jailed", VALIDATOR)?,
            validator_active: gauge_vec(VALIDATOR_ACTIVE, "1 if the validator is active", VALIDATOR)?,
            total_stake: gauge(TOTAL_STAKE, "Stake over all validators")?,
            jailed_stake: gauge(JAILED_STAKE, "Stake of jailed validators")?,
            not_jailed_stake: gauge(NOT_JAILED_STAKE, "Stake of validators not jailed")?,
            active_stake: gauge(ACTIVE_STAKE, "Stake of active validators")?,
            inactive_stake: gauge(INACTIVE_STAKE, "Stake of inactive validators")?,
            validator_count: gauge(VALIDATOR_COUNT, "Validators known to the API")?,
            is_validator: gauge(IS_VALIDATOR, "1 if this node runs a validator")?,
            validator_address: gauge_vec(VALIDATOR_ADDRESS, "Address of this node's validator", &["address"])?,
            latency: gauge_vec(VALIDATOR_LATENCY, "Latest measured latency per validator", VALIDATOR)?,
            latency_round: gauge_vec(VALIDATOR_LATENCY_ROUND, "Round of the latest latency sample", VALIDATOR)?,
            latency_ema: gauge_vec(VALIDATOR_LATENCY_EMA, "Latency moving average per validator", VALIDATOR)?,
            peer_connections: gauge_vec(PEER_CONNECTIONS, "Non-validator peers by verification", &["verified"])?,
            peers_total: gauge(PEERS_TOTAL, "Connected non-validator peers")?,
            block_height: gauge(BLOCK_HEIGHT, "Height of the latest applied block")?,
            latest_block_time: gauge(LATEST_BLOCK_TIME, "Unix time of the latest applied block")?,
            block_time: histogram_vec(
                BLOCK_TIME,
                "Milliseconds between consecutive blocks",
                BLOCK_TIME_BUCKETS,
                STATE_TYPE,
            )?,
            apply_duration: histogram_vec(
                APPLY_DURATION,
                "Block apply duration in milliseconds",
                APPLY_DURATION_BUCKETS,
                STATE_TYPE,
            )?,
            apply_duration_last: gauge_vec(
                APPLY_DURATION_LAST,
                "Apply duration of the latest block in milliseconds",
                STATE_TYPE,
            )?,
            monitor_lines: counter_vec(MONITOR_LINES, "Log lines processed per family", MONITOR_TYPE)?,
            monitor_errors: counter_vec(MONITOR_ERRORS, "Log lines dropped as malformed per family", MONITOR_TYPE)?,
            monitor_last_processed: gauge_vec(
                MONITOR_LAST_PROCESSED,
                "Unix time of the last processed line per family",
                MONITOR_TYPE,
            )?,
            cache_entries: gauge_vec(CACHE_ENTRIES, "Resident entries per identity cache", &["cache"])?,
        })
    }
}

/// Prometheus-backed sink.
///
/// Owns its registry, so series can be deleted: connectivity pairs that
/// reconnect disappear from the next scrape.
pub struct PrometheusSink {
    registry: Registry,
    metrics: Instruments,
}

impl PrometheusSink {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let metrics = Instruments::new(&registry)?;
        Ok(Self { registry, metrics })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current scrape output in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Metrics(e.to_string()))
    }

    /// Bind the scrape endpoint and serve `path` in the background.
    /// Returns the bound address.
    pub async fn serve(self: Arc<Self>, listen: SocketAddr, path: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(listen).await?;
        let local = listener.local_addr()?;

        let app = Router::new().route(path, get(metrics_handler)).with_state(self);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "metrics server stopped");
            }
        });

        info!(address = %local, path, "metrics server listening");
        Ok(local)
    }
}

async fn metrics_handler(State(sink): State<Arc<PrometheusSink>>) -> Response {
    match sink.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

impl MetricsSink for PrometheusSink {
    fn set_vote_round(&self, validator: &ValidatorLabels, round: u64) {
        self.metrics
            .vote_round
            .with_label_values(&validator_values(validator))
            .set(round as f64);
    }

    fn set_vote_time_delta(&self, validator: &ValidatorLabels, seconds: f64) {
        self.metrics
            .vote_time_diff
            .with_label_values(&validator_values(validator))
            .set(seconds);
    }

    fn set_current_round(&self, round: u64) {
        self.metrics.current_round.set(round as f64);
    }

    fn set_rounds_per_block(&self, rounds: u64) {
        self.metrics.rounds_per_block.set(rounds as f64);
    }

    fn increment_proposer(&self, proposer: &ValidatorLabels) {
        self.metrics
            .proposer_count
            .with_label_values(&validator_values(proposer))
            .inc();
    }

    fn increment_qc_signatures(&self, signer: &ValidatorLabels) {
        self.metrics
            .qc_signatures
            .with_label_values(&validator_values(signer))
            .inc();
    }

    fn set_qc_participation_rate(&self, signer: &ValidatorLabels, rate: f64) {
        self.metrics
            .qc_participation
            .with_label_values(&validator_values(signer))
            .set(rate);
    }

    fn observe_qc_size(&self, size: usize) {
        self.metrics.qc_size.observe(size as f64);
    }

    fn increment_tc_participation(&self, voter: &ValidatorLabels) {
        self.metrics
            .tc_participation
            .with_label_values(&validator_values(voter))
            .inc();
    }

    fn increment_tc_blocks(&self, proposer: &ValidatorLabels) {
        self.metrics
            .tc_blocks
            .with_label_values(&validator_values(proposer))
            .inc();
    }

    fn observe_tc_size(&self, size: usize) {
        self.metrics.tc_size.observe(size as f64);
    }

    fn increment_timeout_rounds(&self, suspect: &ValidatorLabels) {
        self.metrics
            .timeout_rounds
            .with_label_values(&validator_values(suspect))
            .inc();
    }

    fn increment_heartbeats_sent(&self, validator: &ValidatorLabels) {
        self.metrics
            .heartbeats_sent
            .with_label_values(&validator_values(validator))
            .inc();
    }

    fn increment_heartbeat_acks(&self, from: &ValidatorLabels, to: &ValidatorLabels) {
        self.metrics
            .heartbeat_acks
            .with_label_values(&[&from.validator, &to.validator, &from.name, &to.name])
            .inc();
    }

    fn observe_heartbeat_delay(&self, delay_ms: f64) {
        self.metrics.heartbeat_delay.observe(delay_ms);
    }

    fn set_heartbeat_status(&self, validator: &ValidatorLabels, kind: HeartbeatStatusKind, value: f64) {
        self.metrics
            .heartbeat_status
            .with_label_values(&[&validator.validator, &validator.signer, &validator.name, kind.as_str()])
            .set(value);
    }

    fn set_connectivity(&self, validator: &ValidatorLabels, peer: &ValidatorLabels, value: f64) {
        self.metrics
            .connectivity
            .with_label_values(&pair_values(validator, peer))
            .set(value);
    }

    fn remove_connectivity(&self, validator: &ValidatorLabels, peer: &ValidatorLabels) {
        if let Err(e) = self
            .metrics
            .connectivity
            .remove_label_values(&pair_values(validator, peer))
        {
            debug!(
                validator = %validator.validator,
                peer = %peer.validator,
                error = %e,
                "no connectivity series to remove"
            );
        }
    }

    fn set_validator_summary(&self, validator: &ValidatorLabels, snapshot: &ValidatorSnapshot) {
        let values = validator_values(validator);
        self.metrics.validator_stake.with_label_values(&values).set(snapshot.stake);
        self.metrics
            .validator_jailed
            .with_label_values(&values)
            .set(flag(snapshot.jailed));
        self.metrics
            .validator_active
            .with_label_values(&values)
            .set(flag(snapshot.active));
    }

    fn set_stake_totals(&self, totals: &StakeTotals) {
        self.metrics.total_stake.set(totals.total);
        self.metrics.jailed_stake.set(totals.jailed);
        self.metrics.not_jailed_stake.set(totals.not_jailed);
        self.metrics.active_stake.set(totals.active);
        self.metrics.inactive_stake.set(totals.inactive);
        self.metrics.validator_count.set(totals.validator_count as f64);
    }

    fn set_is_validator(&self, is_validator: bool) {
        self.metrics.is_validator.set(flag(is_validator));
    }

    fn set_validator_address(&self, address: &str) {
        // only the current address is exported
        self.metrics.validator_address.reset();
        if !address.is_empty() {
            self.metrics.validator_address.with_label_values(&[address]).set(1.0);
        }
    }

    fn set_validator_latency(&self, validator: &ValidatorLabels, latency: f64, round: u64) {
        let values = validator_values(validator);
        self.metrics.latency.with_label_values(&values).set(latency);
        self.metrics.latency_round.with_label_values(&values).set(round as f64);
    }

    fn set_validator_latency_ema(&self, validator: &ValidatorLabels, ema: f64) {
        self.metrics
            .latency_ema
            .with_label_values(&validator_values(validator))
            .set(ema);
    }

    fn set_peer_counts(&self, verified: u64, unverified: u64) {
        self.metrics
            .peer_connections
            .with_label_values(&["true"])
            .set(verified as f64);
        self.metrics
            .peer_connections
            .with_label_values(&["false"])
            .set(unverified as f64);
        self.metrics.peers_total.set((verified + unverified) as f64);
    }

    fn set_block_height(&self, height: u64) {
        self.metrics.block_height.set(height as f64);
    }

    fn set_latest_block_time(&self, unix_secs: i64) {
        self.metrics.latest_block_time.set(unix_secs as f64);
    }

    fn observe_block_time(&self, state: BlockState, millis: f64) {
        self.metrics
            .block_time
            .with_label_values(&[state.as_str()])
            .observe(millis);
    }

    fn observe_apply_duration(&self, state: BlockState, millis: f64) {
        self.metrics
            .apply_duration
            .with_label_values(&[state.as_str()])
            .observe(millis);
        self.metrics
            .apply_duration_last
            .with_label_values(&[state.as_str()])
            .set(millis);
    }

    fn record_monitor_line(&self, family: LogFamily, parsed: bool) {
        let values = [family.as_str()];
        if parsed {
            self.metrics.monitor_lines.with_label_values(&values).inc();
            self.metrics
                .monitor_last_processed
                .with_label_values(&values)
                .set(chrono::Utc::now().timestamp() as f64);
        } else {
            self.metrics.monitor_errors.with_label_values(&values).inc();
        }
    }

    fn set_cache_entries(&self, cache: &'static str, entries: usize) {
        self.metrics
            .cache_entries
            .with_label_values(&[cache])
            .set(entries as f64);
    }
}
