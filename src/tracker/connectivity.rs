//! Disconnected peer pairs, reported as deltas between status snapshots.

use std::collections::BTreeSet;

use crate::event::PeerPair;

/// Changes between two consecutive disconnected-pair snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityDelta {
    /// Pairs to report as disconnected
    pub newly_disconnected: Vec<PeerPair>,
    /// Pairs whose series should be removed
    pub reconnected: Vec<PeerPair>,
}

impl ConnectivityDelta {
    pub fn is_empty(&self) -> bool {
        self.newly_disconnected.is_empty() && self.reconnected.is_empty()
    }
}

/// Only disconnected pairs are ever materialized; a pair absent from the set is
/// connected.
#[derive(Debug, Default)]
pub struct ConnectivityTracker {
    disconnected: BTreeSet<PeerPair>,
}

impl ConnectivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current set with `snapshot` and return what changed.
    /// Pairs present in both snapshots produce nothing.
    pub fn apply(&mut self, snapshot: BTreeSet<PeerPair>) -> ConnectivityDelta {
        let delta = ConnectivityDelta {
            newly_disconnected: snapshot.difference(&self.disconnected).cloned().collect(),
            reconnected: self.disconnected.difference(&snapshot).cloned().collect(),
        };
        self.disconnected = snapshot;
        delta
    }

    pub fn disconnected(&self) -> &BTreeSet<PeerPair> {
        &self.disconnected
    }

    pub fn is_disconnected(&self, pair: &PeerPair) -> bool {
        self.disconnected.contains(pair)
    }
}
