//! Shape-based decoding of consensus and status log lines.
//!
//! Consensus payloads are matched against a closed set of message kinds in a
//! fixed order: `Vote`, `Block`, `Heartbeat` (outgoing only), `HeartbeatAck`
//! (incoming only). The first kind whose key is present decides the decode.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ConsensusEvent, Direction, HeartbeatStatus, ParseError, PeerPair, QuorumCert, TimeoutCert,
};

/// Node log timestamp layout, always UTC and without a zone suffix
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const ROUND_ADVANCE_TAG: &str = "round_advance";
const TIMEOUT_REASON: &str = "timeout";
const UNKNOWN_SUSPECT: &str = "unknown";

/// Classify a raw line, dropping anything malformed at debug level
pub fn classify(line: &str) -> Option<ConsensusEvent> {
    match decode(line) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "dropping unclassifiable line");
            None
        }
    }
}

/// Decode a raw line.
///
/// `Ok(None)` is a well-formed line that carries nothing of interest, such as a
/// message kind that is not tracked or a round advance for a reason other than
/// timeout. `Err` is a line that is malformed or truncated.
pub fn decode(line: &str) -> Result<Option<ConsensusEvent>, ParseError> {
    let line = line.trim();
    if !line.starts_with('[') {
        return Err(ParseError::shape("line is not a JSON array"));
    }

    let parts: Vec<Value> = serde_json::from_str(line)?;
    let [head, body, ..] = parts.as_slice() else {
        return Err(ParseError::shape("expected at least two elements"));
    };

    let head = head
        .as_str()
        .ok_or_else(|| ParseError::shape("first element is not a string"))?;

    if head == ROUND_ADVANCE_TAG {
        return decode_round_advance(body);
    }

    match body {
        Value::Array(inner) => decode_consensus(parse_timestamp(head)?, inner),
        Value::Object(fields) => decode_status(fields).map(Some),
        _ => Err(ParseError::shape("second element is neither array nor object")),
    }
}

/// Parse a node log timestamp as UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ParseError::Timestamp(format!("{raw}: {e}")))
}

fn decode_consensus(
    timestamp: DateTime<Utc>,
    inner: &[Value],
) -> Result<Option<ConsensusEvent>, ParseError> {
    let [direction, payload, ..] = inner else {
        return Err(ParseError::shape("message is not [direction, payload]"));
    };
    let direction = Direction::from_tag(direction.as_str().unwrap_or_default());

    // incoming messages may be wrapped as {source, msg}
    let (source, payload) = match payload.get("msg") {
        Some(msg) if !msg.is_null() => (
            payload.get("source").and_then(Value::as_str).unwrap_or_default(),
            msg,
        ),
        _ => ("", payload),
    };

    if let Some(body) = payload.get("Vote") {
        let vote: VoteBody = from_value(body)?;
        let (signer, round) = vote.into_parts();
        return Ok(Some(ConsensusEvent::Vote {
            signer,
            round,
            timestamp,
        }));
    }

    if let Some(body) = payload.get("Block") {
        let block: BlockBody = from_value(body)?;
        return Ok(Some(ConsensusEvent::Block {
            round: block.round,
            proposer: block.proposer,
            qc: block.qc.map(|qc| QuorumCert {
                round: qc.round,
                signers: qc.signers,
            }),
            tc: block.tc.map(|tc| TimeoutCert {
                voters: tc
                    .timeouts
                    .into_iter()
                    .map(|t| t.validator)
                    .filter(|v| !v.is_empty())
                    .collect(),
            }),
            timestamp,
        }));
    }

    if direction == Direction::Out {
        if let Some(body) = payload.get("Heartbeat") {
            let heartbeat: HeartbeatBody = from_value(body)?;
            if heartbeat.validator.is_empty() {
                return Err(ParseError::MissingField("validator"));
            }
            if heartbeat.random_id == 0 {
                return Err(ParseError::MissingField("random_id"));
            }
            return Ok(Some(ConsensusEvent::HeartbeatSent {
                validator: heartbeat.validator,
                random_id: heartbeat.random_id,
                timestamp,
            }));
        }
    }

    if direction == Direction::In {
        if let Some(body) = payload.get("HeartbeatAck") {
            let ack: HeartbeatAckBody = from_value(body)?;
            if ack.random_id == 0 {
                return Err(ParseError::MissingField("random_id"));
            }
            if source.is_empty() {
                return Err(ParseError::MissingField("source"));
            }
            return Ok(Some(ConsensusEvent::HeartbeatAck {
                random_id: ack.random_id,
                source: source.to_string(),
                timestamp,
            }));
        }
    }

    Ok(None)
}

fn decode_status(fields: &Map<String, Value>) -> Result<ConsensusEvent, ParseError> {
    let disconnected = match fields.get("disconnected_validators") {
        Some(Value::Null) | None => None,
        Some(raw) => Some(decode_disconnected(raw)?),
    };

    let heartbeat_statuses = match fields.get("heartbeat_statuses") {
        Some(Value::Null) | None => Vec::new(),
        Some(raw) => decode_heartbeat_statuses(raw)?,
    };

    Ok(ConsensusEvent::StatusSnapshot {
        disconnected,
        heartbeat_statuses,
    })
}

/// `[[validator, [[peer, round], ...]], ...]`. Rows that do not fit the shape
/// are skipped; a non-array top level is an error.
fn decode_disconnected(raw: &Value) -> Result<BTreeSet<PeerPair>, ParseError> {
    let rows = raw
        .as_array()
        .ok_or_else(|| ParseError::shape("disconnected_validators is not an array"))?;

    let mut pairs = BTreeSet::new();
    for row in rows {
        let Some([validator, peers, ..]) = row.as_array().map(Vec::as_slice) else {
            continue;
        };
        let (Some(validator), Some(peers)) = (validator.as_str(), peers.as_array()) else {
            continue;
        };
        for peer in peers {
            let peer = match peer {
                Value::Array(entry) => entry.first().and_then(Value::as_str),
                other => other.as_str(),
            };
            if let Some(peer) = peer {
                pairs.insert(PeerPair::new(validator, peer));
            }
        }
    }
    Ok(pairs)
}

/// `[[validator, {since_last_success, last_ack_duration}], ...]`
fn decode_heartbeat_statuses(raw: &Value) -> Result<Vec<HeartbeatStatus>, ParseError> {
    let rows = raw
        .as_array()
        .ok_or_else(|| ParseError::shape("heartbeat_statuses is not an array"))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let [validator, info, ..] = row.as_array()?.as_slice() else {
                return None;
            };
            let info: HeartbeatInfoBody = serde_json::from_value(info.clone()).ok()?;
            Some(HeartbeatStatus {
                validator: validator.as_str()?.to_string(),
                since_last_success: info.since_last_success.unwrap_or_default(),
                last_ack_duration: info.last_ack_duration.unwrap_or_default(),
            })
        })
        .collect())
}

fn decode_round_advance(body: &Value) -> Result<Option<ConsensusEvent>, ParseError> {
    let fields = body
        .as_object()
        .ok_or_else(|| ParseError::shape("round_advance payload is not an object"))?;

    if fields.get("reason").and_then(Value::as_str) != Some(TIMEOUT_REASON) {
        return Ok(None);
    }

    let suspect = fields
        .get("suspect")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SUSPECT);

    Ok(Some(ConsensusEvent::RoundAdvance {
        suspect: suspect.to_string(),
    }))
}

/// Validator-set fields of a status line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusRecord {
    pub timestamp: Option<DateTime<Utc>>,
    /// Signer address of the node's own validator, if it is one
    pub home_validator: Option<String>,
    pub current_stakes: Vec<StakeRow>,
}

/// One `[validator, signer, ...]` row of `current_stakes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeRow {
    pub validator: String,
    pub signer: String,
}

/// Parse the validator-set fields out of a status line.
///
/// Unlike [`decode`] this requires exactly `[timestamp, object]`.
pub fn parse_status_record(line: &str) -> Result<StatusRecord, ParseError> {
    let parts: Vec<Value> = serde_json::from_str(line.trim())?;
    let [head, body] = parts.as_slice() else {
        return Err(ParseError::shape("status line is not [timestamp, data]"));
    };
    let fields = body
        .as_object()
        .ok_or_else(|| ParseError::shape("status data is not an object"))?;

    let home_validator = fields
        .get("home_validator")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let current_stakes = fields
        .get("current_stakes")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let row = row.as_array()?;
                    let validator = row.first()?.as_str()?;
                    let signer = row.get(1)?.as_str()?;
                    (!validator.is_empty() && !signer.is_empty()).then(|| StakeRow {
                        validator: validator.to_string(),
                        signer: signer.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(StatusRecord {
        timestamp: head.as_str().and_then(|ts| parse_timestamp(ts).ok()),
        home_validator,
        current_stakes,
    })
}

fn from_value<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, ParseError> {
    Ok(T::deserialize(value)?)
}

/// Votes appear either flat or nested under `vote`
#[derive(Deserialize)]
#[serde(untagged)]
enum VoteBody {
    Flat { round: u64, signer_id: String },
    Nested { vote: NestedVote },
}

#[derive(Deserialize)]
struct NestedVote {
    validator: String,
    round: u64,
}

impl VoteBody {
    fn into_parts(self) -> (String, u64) {
        match self {
            VoteBody::Flat { round, signer_id } => (signer_id, round),
            VoteBody::Nested { vote } => (vote.validator, vote.round),
        }
    }
}

#[derive(Deserialize)]
struct BlockBody {
    #[serde(default)]
    round: u64,
    #[serde(default)]
    proposer: String,
    #[serde(default)]
    qc: Option<QcBody>,
    #[serde(default)]
    tc: Option<TcBody>,
}

#[derive(Deserialize)]
struct QcBody {
    #[serde(default)]
    round: Option<u64>,
    #[serde(default)]
    signers: Vec<String>,
}

#[derive(Deserialize)]
struct TcBody {
    #[serde(default)]
    timeouts: Vec<TimeoutVote>,
}

#[derive(Deserialize)]
struct TimeoutVote {
    #[serde(default)]
    validator: String,
}

#[derive(Deserialize)]
struct HeartbeatBody {
    #[serde(default)]
    validator: String,
    #[serde(default, deserialize_with = "numeric_id")]
    random_id: u64,
}

#[derive(Deserialize)]
struct HeartbeatAckBody {
    #[serde(default, deserialize_with = "numeric_id")]
    random_id: u64,
}

#[derive(Deserialize)]
struct HeartbeatInfoBody {
    since_last_success: Option<f64>,
    last_ack_duration: Option<f64>,
}

/// Random ids are integers but some writers emit them in float notation
fn numeric_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(id) = number.as_u64() {
        return Ok(id);
    }
    match number.as_f64() {
        Some(id) if id >= 0.0 && id.fract() == 0.0 => Ok(id as u64),
        _ => Err(de::Error::custom(format!("invalid random_id {number}"))),
    }
}
