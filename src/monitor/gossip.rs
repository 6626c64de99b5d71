//! Non-validator peer counts from the gossip RPC log.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::Poller;
use crate::sink::MetricsSink;
use crate::tail::{latest_file, rfind_line};
use crate::Result;

const CHILD_PEERS_TAG: &str = "child_peers status";

/// Peers connected to this node, split by verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCounts {
    pub verified: u64,
    pub unverified: u64,
}

impl PeerCounts {
    pub fn total(&self) -> u64 {
        self.verified + self.unverified
    }
}

#[derive(Deserialize)]
struct PeerInfo {
    #[serde(default)]
    verified: bool,
}

/// Counts from one `[ts, ["child_peers status", [[peer, {verified, ..}], ...]]]` line
fn parse_child_peers(line: &str) -> Option<PeerCounts> {
    let parts: Vec<Value> = serde_json::from_str(line).ok()?;
    let [_, body] = parts.as_slice() else {
        return None;
    };
    let [tag, peers] = body.as_array()?.as_slice() else {
        return None;
    };
    if tag.as_str()? != CHILD_PEERS_TAG {
        return None;
    }

    let mut counts = PeerCounts::default();
    for peer in peers.as_array()? {
        let Some([_, info]) = peer.as_array().map(Vec::as_slice) else {
            continue;
        };
        match PeerInfo::deserialize(info) {
            Ok(info) if info.verified => counts.verified += 1,
            Ok(_) => counts.unverified += 1,
            Err(_) => continue,
        }
    }
    Some(counts)
}

/// Peer counts from the last child peers line in `content`
pub fn scan_peer_counts(content: &str) -> Option<PeerCounts> {
    content.lines().rev().find_map(child_peers_in)
}

fn child_peers_in(line: &str) -> Option<PeerCounts> {
    if !line.contains(CHILD_PEERS_TAG) {
        return None;
    }
    parse_child_peers(line)
}

/// Reports peer counts from the newest gossip log file
pub struct GossipPoller {
    gossip_dir: PathBuf,
    sink: Arc<dyn MetricsSink>,
    last: Option<PeerCounts>,
}

impl GossipPoller {
    pub fn new(gossip_dir: PathBuf, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            gossip_dir,
            sink,
            last: None,
        }
    }

    pub fn last(&self) -> Option<PeerCounts> {
        self.last
    }
}

#[async_trait]
impl Poller for GossipPoller {
    fn name(&self) -> &'static str {
        "gossip"
    }

    async fn poll(&mut self) -> Result<()> {
        let Some(latest) = latest_file(&self.gossip_dir).await? else {
            return Ok(());
        };

        let Some(counts) = rfind_line(&latest.path, child_peers_in).await? else {
            debug!(file = %latest.path.display(), "no child peers status line yet");
            return Ok(());
        };

        self.sink.set_peer_counts(counts.verified, counts.unverified);
        if self.last != Some(counts) {
            debug!(
                verified = counts.verified,
                unverified = counts.unverified,
                total = counts.total(),
                "peer counts"
            );
        }
        self.last = Some(counts);
        Ok(())
    }
}
