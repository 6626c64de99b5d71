/*!
# Configuration

Exporter configuration, loaded from an optional TOML file and then overridden
from the environment and the command line. Every section has defaults, so an
empty file (or none) is a valid configuration.

```toml
node_home = "/home/hl/hl"
chain = "mainnet"
metrics_listen = "0.0.0.0:8086"

[tail]
eof_backoff_ms = 10

[intervals]
validator_status_secs = 30
```
*/

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::{ApiConfig, MAINNET_API_URL, TESTNET_API_URL};
use crate::identity::IdentityConfig;
use crate::tail::TailConfig;
use crate::{Error, Result};

/// Network the node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[default]
    Mainnet,
    Testnet,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Mainnet => "mainnet",
            Chain::Testnet => "testnet",
        }
    }

    /// Default base URL of the public API for this chain
    pub fn api_url(&self) -> &'static str {
        match self {
            Chain::Mainnet => MAINNET_API_URL,
            Chain::Testnet => TESTNET_API_URL,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Chain::Mainnet),
            "testnet" => Ok(Chain::Testnet),
            other => Err(Error::Config(format!("unknown chain: {other}"))),
        }
    }
}

/// Log families the node writes under its home directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFamily {
    Consensus,
    Status,
    Proposal,
    Latency,
    LatencyEma,
    Gossip,
    FastBlockTimes,
    SlowBlockTimes,
    BlockTimes,
}

impl LogFamily {
    pub const ALL: [LogFamily; 9] = [
        LogFamily::Consensus,
        LogFamily::Status,
        LogFamily::Proposal,
        LogFamily::Latency,
        LogFamily::LatencyEma,
        LogFamily::Gossip,
        LogFamily::FastBlockTimes,
        LogFamily::SlowBlockTimes,
        LogFamily::BlockTimes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFamily::Consensus => "consensus",
            LogFamily::Status => "status",
            LogFamily::Proposal => "proposal",
            LogFamily::Latency => "latency",
            LogFamily::LatencyEma => "latency_ema",
            LogFamily::Gossip => "gossip",
            LogFamily::FastBlockTimes => "fast_block_times",
            LogFamily::SlowBlockTimes => "slow_block_times",
            LogFamily::BlockTimes => "block_times",
        }
    }

    /// Directory of this family relative to the node home
    pub fn relative_dir(&self) -> &'static str {
        match self {
            LogFamily::Consensus => "data/node_logs/consensus/hourly",
            LogFamily::Status => "data/node_logs/status/hourly",
            LogFamily::Proposal => "data/replica_cmds",
            LogFamily::Latency => "data/validator_latency",
            LogFamily::LatencyEma => "data/validator_latency_ema",
            LogFamily::Gossip => "data/node_logs/gossip_rpc/hourly",
            LogFamily::FastBlockTimes => "data/node_fast_block_times",
            LogFamily::SlowBlockTimes => "data/node_slow_block_times",
            LogFamily::BlockTimes => "data/block_times",
        }
    }

    pub fn dir(&self, node_home: &Path) -> PathBuf {
        node_home.join(self.relative_dir())
    }
}

impl fmt::Display for LogFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll intervals of the periodic workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub validator_status_secs: u64,
    pub validator_api_secs: u64,
    pub latency_secs: u64,
    pub gossip_secs: u64,
    pub maintenance_secs: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            validator_status_secs: 30,
            validator_api_secs: 60,
            latency_secs: 10,
            gossip_secs: 30,
            maintenance_secs: 60,
        }
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// HTTP path of the scrape endpoint
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: "/metrics".to_string(),
        }
    }
}

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Node home directory holding `data/`
    pub node_home: PathBuf,
    pub chain: Chain,
    /// Overrides the chain's default API base URL
    pub api_url: Option<String>,
    /// Address of the Prometheus scrape endpoint
    pub metrics_listen: SocketAddr,
    /// Proposer counts come from the replica parser, so the proposal tailer is off
    pub replica_metrics: bool,
    pub tail: TailConfig,
    pub intervals: IntervalConfig,
    pub identity: IdentityConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            node_home: PathBuf::new(),
            chain: Chain::default(),
            api_url: None,
            metrics_listen: SocketAddr::from(([0, 0, 0, 0], 8086)),
            replica_metrics: false,
            tail: TailConfig::default(),
            intervals: IntervalConfig::default(),
            identity: IdentityConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl ExporterConfig {
    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from an optional file, then fill `node_home` from `NODE_HOME` or
    /// `$HOME/hl` when neither the file nor the caller set it
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if config.node_home.as_os_str().is_empty() {
            config.node_home = default_node_home()?;
        }
        Ok(config)
    }

    /// Reject configurations the workers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.node_home.as_os_str().is_empty() {
            return Err(Error::Config("node_home is not set".into()));
        }
        if self.tail.max_lines_per_poll == 0 {
            return Err(Error::Config("tail.max_lines_per_poll must be positive".into()));
        }
        if !self.metrics.path.starts_with('/') {
            return Err(Error::Config("metrics.path must start with '/'".into()));
        }
        if self.api.retry.max_attempts == 0 {
            return Err(Error::Config("api.retry.max_attempts must be positive".into()));
        }
        let intervals = [
            ("validator_status_secs", self.intervals.validator_status_secs),
            ("validator_api_secs", self.intervals.validator_api_secs),
            ("latency_secs", self.intervals.latency_secs),
            ("gossip_secs", self.intervals.gossip_secs),
            ("maintenance_secs", self.intervals.maintenance_secs),
        ];
        for (name, secs) in intervals {
            if secs == 0 {
                return Err(Error::Config(format!("intervals.{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(self.chain.api_url())
    }

    pub fn family_dir(&self, family: LogFamily) -> PathBuf {
        family.dir(&self.node_home)
    }
}

fn default_node_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("NODE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join("hl"))
        .ok_or_else(|| Error::Config("neither NODE_HOME nor HOME is set".into()))
}
