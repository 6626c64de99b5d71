/*!
# Monitor Module

Long-lived workers that turn node logs into metrics.

## Workers

Two kinds of worker run side by side, one tokio task each:

1. **Tail workers** follow a log family line by line through a
   [`LogTailer`](crate::tail::LogTailer) and hand each line to a [`LineHandler`]:
   - consensus: votes, blocks, heartbeats ([`Dispatcher`])
   - status: connectivity snapshots, heartbeat health, round advances ([`Dispatcher`])
   - proposal: per-proposer block counts ([`ProposalHandler`])
   - block times: height, block interval and apply duration ([`BlockTimeHandler`])

2. **Periodic pollers** wake on a fixed interval ([`Poller`]):
   - validator status: home validator and signer mappings from the status log
   - validator API: summaries, stakes and jail status
   - latency: per-validator latency and its moving average
   - gossip: non-validator peer counts
   - maintenance: cache expiry and cache size reporting

Workers share only the `Arc<IdentityResolver>` and the `Arc<dyn MetricsSink>`.
Every loop watches a `tokio::sync::watch` shutdown flag; a tail worker finishes
the line it is on before it stops.
*/

pub mod block_time;
pub mod dispatcher;
pub mod gossip;
pub mod latency;
pub mod maintenance;
pub mod proposal;
pub mod status;
pub mod validator_api;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::api::{SummaryCache, SummarySource, ValidatorApiClient};
use crate::config::{ExporterConfig, LogFamily};
use crate::event::ParseError;
use crate::identity::IdentityResolver;
use crate::sink::MetricsSink;
use crate::tail::{LogTailer, TailConfig, TailOutcome};
use crate::Result;

pub use block_time::{block_time_families, BlockTimeHandler};
pub use dispatcher::Dispatcher;
pub use gossip::{GossipPoller, PeerCounts};
pub use latency::LatencyPoller;
pub use maintenance::Maintenance;
pub use proposal::ProposalHandler;
pub use status::{populate_signer_mappings, HomeValidator, ValidatorStatusPoller};
pub use validator_api::ValidatorApiPoller;

/// Consumer of one tailed log family
pub trait LineHandler: Send {
    /// Process one complete line. `Err` marks the line as malformed.
    fn handle_line(&mut self, line: &str) -> std::result::Result<(), ParseError>;
}

/// A worker that runs on a fixed interval
#[async_trait]
pub trait Poller: Send {
    fn name(&self) -> &'static str;

    async fn poll(&mut self) -> Result<()>;
}

fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Follow one log family until shutdown
pub async fn run_tail_worker<H: LineHandler>(
    family: LogFamily,
    mut tailer: LogTailer,
    mut handler: H,
    sink: Arc<dyn MetricsSink>,
    config: TailConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(root = %tailer.root().display(), "tail worker started");

    while !is_shutdown(&shutdown) {
        let delay = match tailer.poll().await {
            Ok(TailOutcome::Unavailable) => {
                debug!("log directory unavailable");
                config.idle_recheck()
            }
            Ok(TailOutcome::Lines(lines)) if lines.is_empty() => config.eof_backoff(),
            Ok(TailOutcome::Lines(lines)) => {
                for line in lines {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let parsed = match handler.handle_line(&line) {
                        Ok(()) => true,
                        Err(e) => {
                            debug!(error = %e, "dropping malformed line");
                            false
                        }
                    };
                    sink.record_monitor_line(family, parsed);

                    if is_shutdown(&shutdown) {
                        break;
                    }
                }
                continue;
            }
            Err(e) => {
                warn!(error = %e, "tail error, backing off");
                config.error_backoff()
            }
        };

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("tail worker stopped");
}

/// Drive a poller on `interval` until shutdown. The first poll runs immediately.
pub async fn run_periodic<P: Poller>(mut poller: P, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(?interval, "poller started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !is_shutdown(&shutdown) {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = poller.poll().await {
                    warn!(poller = poller.name(), error = %e, "poll failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("poller stopped");
}

/// Owns and supervises every worker
pub struct Exporter {
    config: ExporterConfig,
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MetricsSink>,
    summaries: Option<Arc<dyn SummarySource>>,
}

impl Exporter {
    pub fn new(config: ExporterConfig, resolver: Arc<IdentityResolver>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            resolver,
            sink,
            summaries: None,
        }
    }

    /// Use `source` instead of the HTTP client for validator summaries
    pub fn with_summary_source(mut self, source: Arc<dyn SummarySource>) -> Self {
        self.summaries = Some(source);
        self
    }

    fn summary_source(&self) -> Result<Arc<dyn SummarySource>> {
        match &self.summaries {
            Some(source) => Ok(source.clone()),
            None => Ok(Arc::new(ValidatorApiClient::new(
                self.config.api_base_url(),
                &self.config.api,
            )?)),
        }
    }

    fn spawn_tail<H: LineHandler + 'static>(
        &self,
        tasks: &mut JoinSet<()>,
        family: LogFamily,
        handler: H,
        shutdown: &watch::Receiver<bool>,
    ) {
        let tailer = LogTailer::new(self.config.family_dir(family), &self.config.tail);
        tasks.spawn(
            run_tail_worker(
                family,
                tailer,
                handler,
                self.sink.clone(),
                self.config.tail.clone(),
                shutdown.clone(),
            )
            .instrument(info_span!("tail", family = %family)),
        );
    }

    fn spawn_poller<P: Poller + 'static>(
        tasks: &mut JoinSet<()>,
        poller: P,
        secs: u64,
        shutdown: &watch::Receiver<bool>,
    ) {
        let span = info_span!("poller", name = poller.name());
        tasks.spawn(run_periodic(poller, Duration::from_secs(secs), shutdown.clone()).instrument(span));
    }

    /// Start every worker and wait until all have stopped
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let status_dir = self.config.family_dir(LogFamily::Status);
        let mapped = populate_signer_mappings(&status_dir, &self.resolver).await;
        info!(mapped, "pre-populated signer mappings from local status");

        let summaries = SummaryCache::new(
            self.summary_source()?,
            Duration::from_secs(self.config.api.cache_freshness_secs),
        );

        let mut tasks = JoinSet::new();

        self.spawn_tail(
            &mut tasks,
            LogFamily::Consensus,
            Dispatcher::new(self.resolver.clone(), self.sink.clone()),
            &shutdown,
        );
        self.spawn_tail(
            &mut tasks,
            LogFamily::Status,
            Dispatcher::new(self.resolver.clone(), self.sink.clone()),
            &shutdown,
        );
        if self.config.replica_metrics {
            info!("replica metrics enabled, proposal tailer disabled");
        } else {
            self.spawn_tail(
                &mut tasks,
                LogFamily::Proposal,
                ProposalHandler::new(self.resolver.clone(), self.sink.clone()),
                &shutdown,
            );
        }

        let block_families = block_time_families(&self.config).await;
        if block_families.is_empty() {
            warn!("no block time logs found, block monitoring disabled");
        }
        for (family, state) in block_families {
            self.spawn_tail(&mut tasks, family, BlockTimeHandler::new(state, self.sink.clone()), &shutdown);
        }

        let intervals = &self.config.intervals;
        Self::spawn_poller(
            &mut tasks,
            ValidatorStatusPoller::new(status_dir, self.resolver.clone(), self.sink.clone()),
            intervals.validator_status_secs,
            &shutdown,
        );
        Self::spawn_poller(
            &mut tasks,
            ValidatorApiPoller::new(summaries, self.resolver.clone(), self.sink.clone()),
            intervals.validator_api_secs,
            &shutdown,
        );
        Self::spawn_poller(
            &mut tasks,
            LatencyPoller::new(
                self.config.family_dir(LogFamily::Latency),
                self.config.family_dir(LogFamily::LatencyEma),
                self.resolver.clone(),
                self.sink.clone(),
            ),
            intervals.latency_secs,
            &shutdown,
        );
        Self::spawn_poller(
            &mut tasks,
            GossipPoller::new(self.config.family_dir(LogFamily::Gossip), self.sink.clone()),
            intervals.gossip_secs,
            &shutdown,
        );
        Self::spawn_poller(
            &mut tasks,
            Maintenance::new(self.resolver.clone(), self.sink.clone()),
            intervals.maintenance_secs,
            &shutdown,
        );

        info!(workers = tasks.len(), "exporter running");

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "worker terminated abnormally");
            }
        }

        info!("exporter stopped");
        Ok(())
    }
}
