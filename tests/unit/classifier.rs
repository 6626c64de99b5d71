use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use serde_json::json;

use hl_exporter::event::{
    classify, decode, parse_status_record, ConsensusEvent, EventKind, HeartbeatStatus, ParseError, PeerPair,
    QuorumCert, TimeoutCert,
};

use crate::common::{ack_line, block_line, heartbeat_line, status_line, ts, vote_line};

#[test]
fn test_flat_vote() {
    let event = classify(&vote_line(ts(1, 250), "0xs1", 42)).unwrap();
    assert_eq!(
        event,
        ConsensusEvent::Vote {
            signer: "0xs1".into(),
            round: 42,
            timestamp: ts(1, 250),
        }
    );
}

#[test]
fn test_nested_vote() {
    let line = json!(["2025-06-01T12:00:01", ["in", {"Vote": {"vote": {"validator": "0xs2", "round": 7}}}]]).to_string();
    match classify(&line) {
        Some(ConsensusEvent::Vote { signer, round, .. }) => {
            assert_eq!(signer, "0xs2");
            assert_eq!(round, 7);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_block_with_certificates() {
    let line = block_line(ts(2, 0), 100, "0xp", &["0xa", "0xb"], Some(&["0xc"]));
    assert_eq!(
        classify(&line),
        Some(ConsensusEvent::Block {
            round: 100,
            proposer: "0xp".into(),
            qc: Some(QuorumCert {
                round: Some(99),
                signers: vec!["0xa".into(), "0xb".into()],
            }),
            tc: Some(TimeoutCert {
                voters: vec!["0xc".into()],
            }),
            timestamp: ts(2, 0),
        })
    );
}

#[test]
fn test_block_null_tc_is_absent() {
    let line = json!(["2025-06-01T12:00:02", ["out", {"Block": {"round": 5, "proposer": "0xp", "qc": null, "tc": null}}]])
        .to_string();
    match classify(&line) {
        Some(ConsensusEvent::Block { qc, tc, .. }) => {
            assert_eq!(qc, None);
            assert_eq!(tc, None);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_malformed_tc_fails_block() {
    let line = json!(["2025-06-01T12:00:02", ["in", {"Block": {"round": 5, "proposer": "0xp", "tc": {"timeouts": 3}}}]])
        .to_string();
    assert!(decode(&line).is_err());
    assert_eq!(classify(&line), None);
}

#[test]
fn test_heartbeat_direction_matters() {
    assert_eq!(
        classify(&heartbeat_line(ts(3, 0), "0xv", 77)),
        Some(ConsensusEvent::HeartbeatSent {
            validator: "0xv".into(),
            random_id: 77,
            timestamp: ts(3, 0),
        })
    );

    let incoming = json!(["2025-06-01T12:00:03", ["in", {"Heartbeat": {"validator": "0xv", "random_id": 77}}]]).to_string();
    assert_eq!(decode(&incoming).unwrap(), None);
}

#[test]
fn test_heartbeat_missing_fields() {
    let line = json!(["2025-06-01T12:00:03", ["out", {"Heartbeat": {"random_id": 77}}]]).to_string();
    assert!(matches!(decode(&line), Err(ParseError::MissingField("validator"))));

    let line = json!(["2025-06-01T12:00:03", ["out", {"Heartbeat": {"validator": "0xv"}}]]).to_string();
    assert!(matches!(decode(&line), Err(ParseError::MissingField("random_id"))));
}

#[test]
fn test_heartbeat_ack() {
    assert_eq!(
        classify(&ack_line(ts(4, 500), "0xpeer", 77)),
        Some(ConsensusEvent::HeartbeatAck {
            random_id: 77,
            source: "0xpeer".into(),
            timestamp: ts(4, 500),
        })
    );

    let unwrapped = json!(["2025-06-01T12:00:04", ["in", {"HeartbeatAck": {"random_id": 77}}]]).to_string();
    assert!(matches!(decode(&unwrapped), Err(ParseError::MissingField("source"))));

    let outgoing = json!(["2025-06-01T12:00:04", ["out", {"HeartbeatAck": {"random_id": 77}}]]).to_string();
    assert_eq!(decode(&outgoing).unwrap(), None);
}

#[test]
fn test_vote_takes_precedence() {
    let line = json!(["2025-06-01T12:00:05", ["in", {
        "Vote": {"round": 1, "signer_id": "0xs"},
        "Block": {"round": 1, "proposer": "0xp"}
    }]])
    .to_string();
    assert_eq!(classify(&line).map(|e| e.kind()), Some(EventKind::Vote));
}

#[test]
fn test_untracked_kind_is_ignored() {
    let line = json!(["2025-06-01T12:00:05", ["in", {"Timeout": {"round": 3}}]]).to_string();
    assert_eq!(decode(&line).unwrap(), None);
}

#[test]
fn test_status_snapshot() {
    let line = status_line(ts(6, 0), &[("0xa", "0xb"), ("0xa", "0xc")]);
    let expected: BTreeSet<_> = [PeerPair::new("0xa", "0xb"), PeerPair::new("0xa", "0xc")].into();
    assert_eq!(
        classify(&line),
        Some(ConsensusEvent::StatusSnapshot {
            disconnected: Some(expected),
            heartbeat_statuses: vec![],
        })
    );
}

#[test]
fn test_status_without_connectivity() {
    let line = json!(["2025-06-01T12:00:06", {
        "heartbeat_statuses": [["0xa", {"since_last_success": 1.5, "last_ack_duration": 0.2}], ["bad"]]
    }])
    .to_string();
    assert_eq!(
        classify(&line),
        Some(ConsensusEvent::StatusSnapshot {
            disconnected: None,
            heartbeat_statuses: vec![HeartbeatStatus {
                validator: "0xa".into(),
                since_last_success: 1.5,
                last_ack_duration: 0.2,
            }],
        })
    );

    let empty = status_line(ts(6, 0), &[]);
    match classify(&empty) {
        Some(ConsensusEvent::StatusSnapshot { disconnected, .. }) => assert_eq!(disconnected, Some(BTreeSet::new())),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_round_advance() {
    let timeout = json!(["round_advance", {"reason": "timeout", "suspect": "0xs"}]).to_string();
    assert_eq!(classify(&timeout), Some(ConsensusEvent::RoundAdvance { suspect: "0xs".into() }));

    let no_suspect = json!(["round_advance", {"reason": "timeout", "suspect": ""}]).to_string();
    assert_eq!(classify(&no_suspect), Some(ConsensusEvent::RoundAdvance { suspect: "unknown".into() }));

    let qc = json!(["round_advance", {"reason": "qc", "suspect": "0xs"}]).to_string();
    assert_eq!(decode(&qc).unwrap(), None);
}

#[test]
fn test_malformed_lines() {
    for line in [
        "",
        "garbage",
        "{\"Vote\":{}}",
        "[\"2025-06-01T12:00:00\"",
        "[\"2025-06-01T12:00:00\"]",
        "[\"not a time\", [\"in\", {}]]",
        "[\"2025-06-01T12:00:00\", 5]",
    ] {
        assert!(decode(line).is_err(), "{line:?} should fail");
        assert_eq!(classify(line), None);
    }
}

#[test]
fn test_status_record() {
    let line = json!(["2025-06-01T12:00:00", {
        "home_validator": "0xs1",
        "current_stakes": [["0xv1", "0xs1", 100], ["0xv2", "0xs2", 50], ["", "0xs3"], ["0xv4"]]
    }])
    .to_string();
    let record = parse_status_record(&line).unwrap();
    assert_eq!(record.home_validator.as_deref(), Some("0xs1"));
    assert_eq!(record.current_stakes.len(), 2);
    assert_eq!(record.current_stakes[1].validator, "0xv2");
    assert_eq!(record.timestamp, Some(ts(0, 0)));

    assert!(parse_status_record("[1, {}, 3]").is_err());
}
