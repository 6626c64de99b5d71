use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use hl_exporter::api::{ApiError, SummarySource, ValidatorSummary};
use hl_exporter::config::{ExporterConfig, LogFamily};
use hl_exporter::identity::IdentityResolver;
use hl_exporter::monitor::Exporter;

use crate::common::*;

struct EmptySource;

#[async_trait]
impl SummarySource for EmptySource {
    async fn fetch_summaries(&self) -> Result<Vec<ValidatorSummary>, ApiError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_exporter_processes_lines_and_stops() {
    let home = TempDir::new().unwrap();
    let config = ExporterConfig {
        node_home: home.path().to_path_buf(),
        ..ExporterConfig::default()
    };

    // an existing status file seeds mappings; the tailer starts at its end
    let status_file = config.family_dir(LogFamily::Status).join("20250601/12");
    std::fs::create_dir_all(status_file.parent().unwrap()).unwrap();
    std::fs::write(
        &status_file,
        format!("{}\n", stakes_line(ts(0, 0), Some(SIGNER_A), &[(VALIDATOR_A, SIGNER_A)])),
    )
    .unwrap();

    let consensus_file = config.family_dir(LogFamily::Consensus).join("20250601/12");
    std::fs::create_dir_all(consensus_file.parent().unwrap()).unwrap();
    std::fs::write(&consensus_file, "").unwrap();

    let resolver = Arc::new(IdentityResolver::default());
    let sink = RecordingSink::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let exporter = Exporter::new(config, resolver.clone(), sink.clone()).with_summary_source(Arc::new(EmptySource));
    let handle = tokio::spawn(exporter.run(shutdown_rx));

    // let the tailer open the consensus file at its end
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut file = std::fs::OpenOptions::new().append(true).open(&consensus_file).unwrap();
    std::io::Write::write_all(&mut file, format!("{}\n", vote_line(ts(1, 0), SIGNER_A, 9)).as_bytes()).unwrap();

    let mut voted = false;
    for _ in 0..100 {
        if sink.count(|call| matches!(call, SinkCall::VoteRound(_, 9))) == 1 {
            voted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(voted, "vote line was not processed");
    assert_eq!(resolver.validator_for_signer(SIGNER_A).as_deref(), Some(VALIDATOR_A));
    assert!(sink.count(|call| *call == SinkCall::MonitorLine(LogFamily::Consensus, true)) >= 1);
    assert!(sink.count(|call| *call == SinkCall::IsValidator(true)) >= 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("exporter stops on shutdown")
        .unwrap()
        .unwrap();
}
