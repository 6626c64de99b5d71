/*!
# Event Module

Typed form of the node's consensus and status log lines.

Consensus lines carry `[timestamp, [direction, payload]]`, where the payload is
an object keyed by the message kind (`Vote`, `Block`, `Heartbeat`,
`HeartbeatAck`) and is sometimes wrapped as `{source, msg}`. Status lines carry
`[timestamp, {disconnected_validators, heartbeat_statuses, ...}]`, and the same
directory also receives `["round_advance", {reason, suspect}]` lines.

[`classify`] turns one raw line into a [`ConsensusEvent`], or nothing when the
line is malformed or of no interest. Events are ephemeral: they are built,
dispatched and dropped.
*/

pub mod classifier;
pub mod error;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use classifier::{classify, decode, parse_status_record, parse_timestamp, StakeRow, StatusRecord};
pub use error::ParseError;

/// Direction a consensus message travelled relative to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
    Other,
}

impl Direction {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "in" => Direction::In,
            "out" => Direction::Out,
            _ => Direction::Other,
        }
    }
}

/// Quorum certificate carried by a block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCert {
    pub round: Option<u64>,
    pub signers: Vec<String>,
}

/// Timeout certificate carried by a block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutCert {
    pub voters: Vec<String>,
}

/// A validator that reports one of its peers as disconnected
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerPair {
    pub validator: String,
    pub peer: String,
}

impl PeerPair {
    pub fn new(validator: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            peer: peer.into(),
        }
    }
}

/// Heartbeat health the node reports for one validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatStatus {
    pub validator: String,
    pub since_last_success: f64,
    pub last_ack_duration: f64,
}

/// One classified log line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusEvent {
    Vote {
        signer: String,
        round: u64,
        timestamp: DateTime<Utc>,
    },
    Block {
        round: u64,
        proposer: String,
        qc: Option<QuorumCert>,
        tc: Option<TimeoutCert>,
        timestamp: DateTime<Utc>,
    },
    HeartbeatSent {
        validator: String,
        random_id: u64,
        timestamp: DateTime<Utc>,
    },
    HeartbeatAck {
        random_id: u64,
        source: String,
        timestamp: DateTime<Utc>,
    },
    /// `disconnected` is `None` when the line does not report connectivity at
    /// all, which is different from reporting an empty set.
    StatusSnapshot {
        disconnected: Option<BTreeSet<PeerPair>>,
        heartbeat_statuses: Vec<HeartbeatStatus>,
    },
    /// Round advanced on timeout, blaming `suspect`
    RoundAdvance { suspect: String },
}

impl ConsensusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConsensusEvent::Vote { .. } => EventKind::Vote,
            ConsensusEvent::Block { .. } => EventKind::Block,
            ConsensusEvent::HeartbeatSent { .. } => EventKind::HeartbeatSent,
            ConsensusEvent::HeartbeatAck { .. } => EventKind::HeartbeatAck,
            ConsensusEvent::StatusSnapshot { .. } => EventKind::StatusSnapshot,
            ConsensusEvent::RoundAdvance { .. } => EventKind::RoundAdvance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Vote,
    Block,
    HeartbeatSent,
    HeartbeatAck,
    StatusSnapshot,
    RoundAdvance,
}
