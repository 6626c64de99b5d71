//! Routes classified consensus and status events to the trackers and the sink.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::LineHandler;
use crate::event::{self, ConsensusEvent, HeartbeatStatus, ParseError, PeerPair, QuorumCert, TimeoutCert};
use crate::identity::{IdentityResolver, ValidatorLabels};
use crate::sink::{HeartbeatStatusKind, MetricsSink};
use crate::tracker::{ConnectivityTracker, HeartbeatCorrelator, ParticipationConfig, ParticipationTracker};

/// Consumer of classified events. One instance per tailed family; each owns its
/// trackers outright.
pub struct Dispatcher {
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MetricsSink>,
    participation: ParticipationTracker,
    heartbeats: HeartbeatCorrelator,
    connectivity: ConnectivityTracker,
    /// Labels each disconnected pair was reported under, so removal matches
    pair_labels: HashMap<PeerPair, (ValidatorLabels, ValidatorLabels)>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<IdentityResolver>, sink: Arc<dyn MetricsSink>) -> Self {
        Self::with_participation(resolver, sink, ParticipationConfig::default())
    }

    pub fn with_participation(
        resolver: Arc<IdentityResolver>,
        sink: Arc<dyn MetricsSink>,
        participation: ParticipationConfig,
    ) -> Self {
        Self {
            resolver,
            sink,
            participation: ParticipationTracker::new(participation),
            heartbeats: HeartbeatCorrelator::default(),
            connectivity: ConnectivityTracker::new(),
            pair_labels: HashMap::new(),
        }
    }

    pub fn participation(&self) -> &ParticipationTracker {
        &self.participation
    }

    pub fn heartbeats(&self) -> &HeartbeatCorrelator {
        &self.heartbeats
    }

    pub fn connectivity(&self) -> &ConnectivityTracker {
        &self.connectivity
    }

    pub fn dispatch(&mut self, event: ConsensusEvent) {
        self.dispatch_at(event, Utc::now(), Instant::now());
    }

    /// Dispatch with an explicit wall clock and monotonic clock
    pub fn dispatch_at(&mut self, event: ConsensusEvent, now: DateTime<Utc>, instant: Instant) {
        match event {
            ConsensusEvent::Vote {
                signer,
                round,
                timestamp,
            } => self.on_vote(&signer, round, timestamp, now),
            ConsensusEvent::Block {
                round,
                proposer,
                qc,
                tc,
                ..
            } => self.on_block(round, &proposer, qc, tc, instant),
            ConsensusEvent::HeartbeatSent {
                validator,
                random_id,
                timestamp,
            } => self.on_heartbeat_sent(&validator, random_id, timestamp, now),
            ConsensusEvent::HeartbeatAck {
                random_id,
                source,
                timestamp,
            } => self.on_heartbeat_ack(random_id, &source, timestamp),
            ConsensusEvent::StatusSnapshot {
                disconnected,
                heartbeat_statuses,
            } => {
                if let Some(disconnected) = disconnected {
                    self.on_disconnected(disconnected);
                }
                self.on_heartbeat_statuses(&heartbeat_statuses);
            }
            ConsensusEvent::RoundAdvance { suspect } => {
                self.sink
                    .increment_timeout_rounds(&self.resolver.labels_for(&suspect));
            }
        }
    }

    fn on_vote(&self, signer: &str, round: u64, timestamp: DateTime<Utc>, now: DateTime<Utc>) {
        // votes from signers without a known validator are not reported
        let Some(validator) = self.resolver.validator_for_signer(signer) else {
            trace!(%signer, "vote from unmapped signer");
            return;
        };
        let labels = self.resolver.labels_for(&validator);

        if round > 0 {
            self.sink.set_vote_round(&labels, round);
        }
        let delta = (now - timestamp).num_milliseconds() as f64 / 1_000.0;
        self.sink.set_vote_time_delta(&labels, delta);
    }

    fn on_block(
        &mut self,
        round: u64,
        proposer: &str,
        qc: Option<QuorumCert>,
        tc: Option<TimeoutCert>,
        instant: Instant,
    ) {
        let proposer = self.resolver.labels_for(proposer);
        debug!(
            round,
            proposer = %proposer.validator,
            has_qc = qc.is_some(),
            has_tc = tc.is_some(),
            "block"
        );

        if round > 0 {
            self.sink.set_current_round(round);
            if let Some(delta) = self.participation.observe_round(round) {
                self.sink.set_rounds_per_block(delta);
            }
        }

        if let Some(qc) = qc {
            for signer in qc.signers.iter().filter(|s| !s.is_empty()) {
                self.sink
                    .increment_qc_signatures(&self.resolver.labels_for(signer));
            }
            self.sink.observe_qc_size(qc.signers.len());

            for (signer, rate) in self.participation.record_qc(&qc.signers, instant) {
                self.sink
                    .set_qc_participation_rate(&self.resolver.labels_for(&signer), rate);
            }
        }

        if let Some(tc) = tc {
            let size = self.participation.record_tc(&tc.voters);
            self.sink.observe_tc_size(size);
            for voter in &tc.voters {
                self.sink
                    .increment_tc_participation(&self.resolver.labels_for(voter));
            }
            self.sink.increment_tc_blocks(&proposer);
        }
    }

    fn on_heartbeat_sent(
        &mut self,
        validator: &str,
        random_id: u64,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let validator = self.resolver.resolve_or_self(validator);
        let purged = self.heartbeats.on_sent(random_id, validator.clone(), timestamp, now);
        if purged > 0 {
            trace!(purged, "expired heartbeat records");
        }
        self.sink
            .increment_heartbeats_sent(&self.resolver.labels_for(&validator));
    }

    fn on_heartbeat_ack(&self, random_id: u64, source: &str, timestamp: DateTime<Utc>) {
        let Some(matched) = self.heartbeats.on_ack(random_id, timestamp) else {
            trace!(random_id, "ack for unknown heartbeat");
            return;
        };

        self.sink.observe_heartbeat_delay(matched.delay_ms());
        self.sink.increment_heartbeat_acks(
            &self.resolver.labels_for(&matched.validator),
            &self.resolver.labels_for(source),
        );
    }

    fn on_disconnected(&mut self, snapshot: BTreeSet<PeerPair>) {
        let delta = self.connectivity.apply(snapshot);

        for pair in delta.reconnected {
            let (validator, peer) = self
                .pair_labels
                .remove(&pair)
                .unwrap_or_else(|| self.pair_labels_for(&pair));
            self.sink.remove_connectivity(&validator, &peer);
        }

        for pair in delta.newly_disconnected {
            let (validator, peer) = self.pair_labels_for(&pair);
            self.sink.set_connectivity(&validator, &peer, 0.0);
            self.pair_labels.insert(pair, (validator, peer));
        }
    }

    fn pair_labels_for(&self, pair: &PeerPair) -> (ValidatorLabels, ValidatorLabels) {
        (
            self.resolver.labels_for(&pair.validator),
            self.resolver.labels_for(&pair.peer),
        )
    }

    fn on_heartbeat_statuses(&self, statuses: &[HeartbeatStatus]) {
        for status in statuses {
            let labels = self.resolver.labels_for(&status.validator);
            if status.since_last_success > 0.0 {
                self.sink.set_heartbeat_status(
                    &labels,
                    HeartbeatStatusKind::SinceLastSuccess,
                    status.since_last_success,
                );
            }
            if status.last_ack_duration > 0.0 {
                self.sink.set_heartbeat_status(
                    &labels,
                    HeartbeatStatusKind::LastAckDuration,
                    status.last_ack_duration,
                );
            }
        }
    }
}

impl LineHandler for Dispatcher {
    fn handle_line(&mut self, line: &str) -> Result<(), ParseError> {
        if let Some(event) = event::decode(line)? {
            self.dispatch(event);
        }
        Ok(())
    }
}
