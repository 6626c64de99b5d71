use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use hl_exporter::config::{ExporterConfig, LogFamily};
use hl_exporter::monitor::{block_time_families, BlockTimeHandler, LineHandler};
use hl_exporter::sink::BlockState;
use hl_exporter::tail::{LogTailer, TailConfig, TailOutcome};

use crate::common::*;

fn config(home: &Path) -> ExporterConfig {
    ExporterConfig {
        node_home: home.to_path_buf(),
        ..Default::default()
    }
}

fn append(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn block_line(height: u64, secs: u32, millis: u32, apply_secs: f64) -> String {
    let line = json!({
        "height": height,
        "block_time": format_ts(ts(secs, millis)),
        "apply_duration": apply_secs,
        "begin_block_wall_time": format_ts(ts(secs, millis)),
    });
    format!("{line}\n")
}

async fn tail_into(tailer: &mut LogTailer, handler: &mut BlockTimeHandler) {
    match tailer.poll().await.unwrap() {
        TailOutcome::Lines(lines) => {
            for line in lines {
                handler.handle_line(&line).unwrap();
            }
        }
        TailOutcome::Unavailable => panic!("block time log unavailable"),
    }
}

#[tokio::test]
async fn test_family_selection() {
    let home = TempDir::new().unwrap();
    let config = config(home.path());
    assert!(block_time_families(&config).await.is_empty());

    fs::create_dir_all(config.family_dir(LogFamily::BlockTimes)).unwrap();
    assert_eq!(
        block_time_families(&config).await,
        vec![(LogFamily::BlockTimes, BlockState::Legacy)]
    );

    // the split logs replace the legacy one as soon as either exists
    fs::create_dir_all(config.family_dir(LogFamily::SlowBlockTimes)).unwrap();
    assert_eq!(
        block_time_families(&config).await,
        vec![(LogFamily::SlowBlockTimes, BlockState::Slow)]
    );

    fs::create_dir_all(config.family_dir(LogFamily::FastBlockTimes)).unwrap();
    assert_eq!(
        block_time_families(&config).await,
        vec![
            (LogFamily::FastBlockTimes, BlockState::Fast),
            (LogFamily::SlowBlockTimes, BlockState::Slow),
        ]
    );
}

#[tokio::test]
async fn test_fast_log_reports_height_and_intervals() {
    let home = TempDir::new().unwrap();
    let config = config(home.path());
    let file = config.family_dir(LogFamily::FastBlockTimes).join("20250601/12");
    append(&file, &block_line(9, 0, 0, 0.001));

    let sink = RecordingSink::new();
    let mut handler = BlockTimeHandler::new(BlockState::Fast, sink.clone());
    let mut tailer = LogTailer::new(config.family_dir(LogFamily::FastBlockTimes), &TailConfig::default());

    // history before startup is skipped
    tail_into(&mut tailer, &mut handler).await;
    assert!(sink.calls().is_empty());

    append(&file, &block_line(10, 1, 0, 0.002));
    append(&file, &block_line(11, 1, 80, 0.004));
    tail_into(&mut tailer, &mut handler).await;

    let second = ts(1, 0).timestamp();
    assert_eq!(
        sink.take(),
        vec![
            SinkCall::BlockHeight(10),
            SinkCall::LatestBlockTime(second),
            SinkCall::ApplyDuration(BlockState::Fast, 2.0),
            SinkCall::BlockTime(BlockState::Fast, 80.0),
            SinkCall::BlockHeight(11),
            SinkCall::LatestBlockTime(second),
            SinkCall::ApplyDuration(BlockState::Fast, 4.0),
        ]
    );
}

#[tokio::test]
async fn test_slow_log_leaves_height_alone() {
    let sink = RecordingSink::new();
    let mut handler = BlockTimeHandler::new(BlockState::Slow, sink.clone());

    handler.handle_line(block_line(5, 0, 0, 0.5).trim_end()).unwrap();
    handler.handle_line(block_line(6, 2, 0, 0.25).trim_end()).unwrap();

    assert_eq!(
        sink.take(),
        vec![
            SinkCall::ApplyDuration(BlockState::Slow, 500.0),
            SinkCall::BlockTime(BlockState::Slow, 2_000.0),
            SinkCall::ApplyDuration(BlockState::Slow, 250.0),
        ]
    );
}

#[tokio::test]
async fn test_out_of_order_block_time_not_observed() {
    let sink = RecordingSink::new();
    let mut handler = BlockTimeHandler::new(BlockState::Legacy, sink.clone());

    handler.handle_line(block_line(5, 10, 0, 0.001).trim_end()).unwrap();
    handler.handle_line(block_line(6, 10, 0, 0.001).trim_end()).unwrap();
    handler.handle_line(block_line(7, 9, 0, 0.001).trim_end()).unwrap();

    assert_eq!(sink.count(|call| matches!(call, SinkCall::BlockTime(..))), 0);
    assert_eq!(sink.count(|call| matches!(call, SinkCall::BlockHeight(_))), 3);
    assert!(handler.handle_line("{\"height\":8}").is_err());
}
