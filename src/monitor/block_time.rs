//! Applied-block timing from the node's block time logs.
//!
//! Each line is one applied block:
//! `{"height": 100, "block_time": "2025-06-01T12:00:00.123", "apply_duration": 0.0021, ...}`
//! with `apply_duration` in seconds. Nodes with split execution write a fast and a
//! slow log; older nodes write a single legacy log.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::LineHandler;
use crate::config::{ExporterConfig, LogFamily};
use crate::event::classifier::parse_timestamp;
use crate::event::ParseError;
use crate::sink::{BlockState, MetricsSink};

/// One line of a block time log
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockTimeRecord {
    pub height: u64,
    pub block_time: String,
    /// Seconds
    pub apply_duration: f64,
    #[serde(default)]
    pub begin_block_wall_time: Option<String>,
}

/// An applied block, timestamps parsed
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedBlock {
    pub height: u64,
    pub block_time: DateTime<Utc>,
    pub apply_duration_ms: f64,
}

pub fn parse_block_time_line(line: &str) -> Result<AppliedBlock, ParseError> {
    let record: BlockTimeRecord = serde_json::from_str(line)?;
    Ok(AppliedBlock {
        height: record.height,
        block_time: parse_timestamp(&record.block_time)?,
        apply_duration_ms: record.apply_duration * 1_000.0,
    })
}

/// Tail handler for one block time log
pub struct BlockTimeHandler {
    state: BlockState,
    sink: Arc<dyn MetricsSink>,
    last_block_time: Option<DateTime<Utc>>,
}

impl BlockTimeHandler {
    pub fn new(state: BlockState, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            state,
            sink,
            last_block_time: None,
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn record(&mut self, block: &AppliedBlock) {
        if let Some(last) = self.last_block_time {
            let diff = (block.block_time - last).num_milliseconds();
            if diff > 0 {
                self.sink.observe_block_time(self.state, diff as f64);
            } else {
                warn!(state = self.state.as_str(), height = block.height, diff, "non-increasing block time");
            }
        }
        self.last_block_time = Some(block.block_time);

        if self.state.reports_height() {
            self.sink.set_block_height(block.height);
            self.sink.set_latest_block_time(block.block_time.timestamp());
        }
        self.sink.observe_apply_duration(self.state, block.apply_duration_ms);
    }
}

impl LineHandler for BlockTimeHandler {
    fn handle_line(&mut self, line: &str) -> Result<(), ParseError> {
        let block = parse_block_time_line(line)?;
        debug!(
            state = self.state.as_str(),
            height = block.height,
            apply_ms = block.apply_duration_ms,
            "applied block"
        );
        self.record(&block);
        Ok(())
    }
}

/// Block time logs to follow: fast and slow when either exists, otherwise the
/// legacy log, otherwise none
pub async fn block_time_families(config: &ExporterConfig) -> Vec<(LogFamily, BlockState)> {
    let fast = exists(&config.family_dir(LogFamily::FastBlockTimes)).await;
    let slow = exists(&config.family_dir(LogFamily::SlowBlockTimes)).await;

    if fast || slow {
        let mut families = Vec::with_capacity(2);
        if fast {
            families.push((LogFamily::FastBlockTimes, BlockState::Fast));
        }
        if slow {
            families.push((LogFamily::SlowBlockTimes, BlockState::Slow));
        }
        return families;
    }

    if exists(&config.family_dir(LogFamily::BlockTimes)).await {
        vec![(LogFamily::BlockTimes, BlockState::Legacy)]
    } else {
        Vec::new()
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
