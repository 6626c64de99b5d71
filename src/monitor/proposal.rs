//! Per-proposer block counts from the replica command log.

use std::sync::Arc;

use serde::Deserialize;
use tracing::trace;

use super::LineHandler;
use crate::event::ParseError;
use crate::identity::IdentityResolver;
use crate::sink::MetricsSink;

#[derive(Deserialize)]
struct ReplicaLine {
    abci_block: Option<AbciBlock>,
}

#[derive(Deserialize)]
struct AbciBlock {
    proposer: Option<String>,
}

/// Extract `abci_block.proposer` from a replica command line
pub fn parse_proposer(line: &str) -> Result<String, ParseError> {
    let parsed: ReplicaLine = serde_json::from_str(line)?;
    parsed
        .abci_block
        .and_then(|block| block.proposer)
        .filter(|proposer| !proposer.is_empty())
        .ok_or(ParseError::MissingField("abci_block.proposer"))
}

/// Counts one block per replica command line for its proposer
pub struct ProposalHandler {
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MetricsSink>,
}

impl ProposalHandler {
    pub fn new(resolver: Arc<IdentityResolver>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { resolver, sink }
    }
}

impl LineHandler for ProposalHandler {
    fn handle_line(&mut self, line: &str) -> Result<(), ParseError> {
        let proposer = parse_proposer(line)?;
        trace!(%proposer, "block proposed");
        self.sink
            .increment_proposer(&self.resolver.labels_for(&proposer));
        Ok(())
    }
}
