use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hl_exporter::{Chain, Exporter, ExporterConfig, IdentityResolver, MetricsSink, PrometheusSink};

#[derive(Parser)]
#[clap(name = "hl-exporter", version, about)]
struct Args {
    /// TOML configuration file
    #[clap(long, short)]
    config: Option<PathBuf>,

    /// Node home directory (default: $HOME/hl)
    #[clap(long, env = "NODE_HOME")]
    node_home: Option<PathBuf>,

    /// mainnet or testnet
    #[clap(long)]
    chain: Option<Chain>,

    /// Prometheus scrape address
    #[clap(long)]
    listen: Option<SocketAddr>,

    /// Log filter, overridden by RUST_LOG
    #[clap(long, default_value = "info")]
    log_level: String,

    /// Proposer counts come from the replica parser; skip the proposal log
    #[clap(long)]
    replica_metrics: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ExporterConfig> {
        let mut config = ExporterConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        if let Some(node_home) = self.node_home {
            config.node_home = node_home;
        }
        if let Some(chain) = self.chain {
            config.chain = chain;
        }
        if let Some(listen) = self.listen {
            config.metrics_listen = listen;
        }
        config.replica_metrics |= self.replica_metrics;

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.into_config()?;
    info!(
        node_home = %config.node_home.display(),
        chain = %config.chain,
        listen = %config.metrics_listen,
        "starting exporter"
    );

    let prometheus = Arc::new(PrometheusSink::new().context("failed to register metrics")?);
    prometheus
        .clone()
        .serve(config.metrics_listen, &config.metrics.path)
        .await
        .context("failed to start metrics endpoint")?;
    let sink: Arc<dyn MetricsSink> = prometheus;
    let resolver = Arc::new(IdentityResolver::new(&config.identity));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            // dropping the sender would stop every worker
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    Exporter::new(config, resolver, sink)
        .run(shutdown_rx)
        .await
        .context("exporter failed")?;
    Ok(())
}
