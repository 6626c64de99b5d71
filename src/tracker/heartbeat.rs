//! Heartbeat round-trip correlation.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

/// Seconds a sent heartbeat waits for acks before it is forgotten
pub const HEARTBEAT_RETENTION_SECS: i64 = 5 * 60;

/// An outgoing heartbeat waiting for acks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRecord {
    pub validator: String,
    pub sent_at: DateTime<Utc>,
}

/// An ack matched to the heartbeat it answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatMatch {
    /// Validator that sent the heartbeat
    pub validator: String,
    pub delay: TimeDelta,
}

impl HeartbeatMatch {
    pub fn delay_ms(&self) -> f64 {
        self.delay.num_milliseconds() as f64
    }
}

/// Pairs heartbeat acks with the heartbeats they answer, by random id.
///
/// Every peer acks the same heartbeat, so a match does not consume the record.
#[derive(Debug)]
pub struct HeartbeatCorrelator {
    records: HashMap<u64, HeartbeatRecord>,
    retention: TimeDelta,
}

impl HeartbeatCorrelator {
    pub fn new(retention: TimeDelta) -> Self {
        Self {
            records: HashMap::new(),
            retention,
        }
    }

    /// Store a sent heartbeat, then purge records older than the retention
    /// relative to `now`. Returns how many were purged.
    pub fn on_sent(
        &mut self,
        random_id: u64,
        validator: impl Into<String>,
        sent_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> usize {
        self.records.insert(
            random_id,
            HeartbeatRecord {
                validator: validator.into(),
                sent_at,
            },
        );

        let cutoff = now - self.retention;
        let before = self.records.len();
        self.records.retain(|_, record| record.sent_at >= cutoff);
        before - self.records.len()
    }

    /// Match an ack. Unknown ids are a normal outcome and yield `None`.
    pub fn on_ack(&self, random_id: u64, acked_at: DateTime<Utc>) -> Option<HeartbeatMatch> {
        self.records.get(&random_id).map(|record| HeartbeatMatch {
            validator: record.validator.clone(),
            delay: acked_at - record.sent_at,
        })
    }

    pub fn pending(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, random_id: u64) -> Option<&HeartbeatRecord> {
        self.records.get(&random_id)
    }
}

impl Default for HeartbeatCorrelator {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(HEARTBEAT_RETENTION_SECS))
    }
}
