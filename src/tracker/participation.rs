//! QC and TC participation bookkeeping.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Sliding window limits for QC participation rates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipationConfig {
    /// Maximum number of QCs kept in the window
    pub window_size: usize,
    /// Maximum age of a QC kept in the window
    pub window_age: Duration,
}

impl Default for ParticipationConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            window_age: Duration::from_secs(60 * 60),
        }
    }
}

/// Signers of one QC and when it was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    pub recorded_at: Instant,
    pub signers: Vec<String>,
}

/// Tracks who signs quorum and timeout certificates.
///
/// Lifetime counters are cumulative. Participation rates come from a window
/// bounded both by entry count and by entry age, and are reported for every
/// signer ever seen so that one who stops signing drops to zero.
#[derive(Debug, Default)]
pub struct ParticipationTracker {
    config: ParticipationConfig,
    window: VecDeque<WindowEntry>,
    qc_signatures: HashMap<String, u64>,
    tc_votes: HashMap<String, u64>,
    last_block_round: u64,
}

impl ParticipationTracker {
    pub fn new(config: ParticipationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Record a QC and return the refreshed participation rate, in percent, of
    /// every signer seen so far, ordered by signer
    pub fn record_qc(&mut self, signers: &[String], now: Instant) -> Vec<(String, f64)> {
        let signers: Vec<String> = signers.iter().filter(|s| !s.is_empty()).cloned().collect();

        for signer in &signers {
            *self.qc_signatures.entry(signer.clone()).or_default() += 1;
        }

        self.window.push_back(WindowEntry {
            recorded_at: now,
            signers,
        });
        self.evict(now);

        self.rates()
    }

    fn evict(&mut self, now: Instant) {
        while self.window.len() > self.config.window_size.max(1) {
            self.window.pop_front();
        }
        while self
            .window
            .front()
            .is_some_and(|entry| now.saturating_duration_since(entry.recorded_at) > self.config.window_age)
        {
            self.window.pop_front();
        }
    }

    /// Participation rate of every lifetime signer over the current window
    pub fn rates(&self) -> Vec<(String, f64)> {
        let total = self.window.len();

        let mut in_window: HashMap<&str, usize> = HashMap::new();
        for entry in &self.window {
            for signer in &entry.signers {
                *in_window.entry(signer.as_str()).or_default() += 1;
            }
        }

        let mut rates: Vec<(String, f64)> = self
            .qc_signatures
            .keys()
            .map(|signer| {
                let seen = in_window.get(signer.as_str()).copied().unwrap_or(0);
                let rate = if total == 0 {
                    0.0
                } else {
                    seen as f64 / total as f64 * 100.0
                };
                (signer.clone(), rate)
            })
            .collect();
        rates.sort_by(|a, b| a.0.cmp(&b.0));
        rates
    }

    /// Count each TC voter and return the certificate size
    pub fn record_tc(&mut self, voters: &[String]) -> usize {
        for voter in voters.iter().filter(|v| !v.is_empty()) {
            *self.tc_votes.entry(voter.clone()).or_default() += 1;
        }
        voters.len()
    }

    /// Note a block round. Returns the rounds elapsed since the previous block
    /// when the round moved forward.
    pub fn observe_round(&mut self, round: u64) -> Option<u64> {
        if round == 0 {
            return None;
        }
        let previous = self.last_block_round;
        self.last_block_round = round;
        (previous > 0 && round > previous).then(|| round - previous)
    }

    pub fn qc_signatures(&self, signer: &str) -> u64 {
        self.qc_signatures.get(signer).copied().unwrap_or(0)
    }

    pub fn tc_votes(&self, voter: &str) -> u64 {
        self.tc_votes.get(voter).copied().unwrap_or(0)
    }

    pub fn window(&self) -> impl Iterator<Item = &WindowEntry> {
        self.window.iter()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn last_block_round(&self) -> u64 {
        self.last_block_round
    }
}
