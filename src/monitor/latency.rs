//! Validator latency measurements and their moving average.
//!
//! The node writes one directory per validator,
//! `validator_latency/<0xaddr>/<YYYYMMDD>`, each line a `{time, round, latency}`
//! record, plus a daily `validator_latency_ema/<YYYYMMDD>` file whose lines are
//! `[timestamp, [[validator, ema], ...]]`.

use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

use super::Poller;
use crate::event::{parse_timestamp, ParseError};
use crate::identity::IdentityResolver;
use crate::sink::MetricsSink;
use crate::tail::read_last_line;
use crate::Result;

/// EMA values at or above this mark a validator with no recent samples
pub const EMA_NO_DATA: f64 = 0.4;

/// One line of a per-validator latency file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LatencyEntry {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub round: u64,
    pub latency: f64,
}

/// Parse the EMA line into its timestamp and `(validator, ema)` pairs
pub fn parse_ema_line(line: &str) -> std::result::Result<(DateTime<Utc>, Vec<(String, f64)>), ParseError> {
    let parts: Vec<Value> = serde_json::from_str(line.trim())?;
    let [timestamp, latencies] = parts.as_slice() else {
        return Err(ParseError::shape("EMA line is not [timestamp, latencies]"));
    };

    let timestamp = timestamp
        .as_str()
        .ok_or_else(|| ParseError::shape("EMA timestamp is not a string"))
        .and_then(parse_timestamp)?;
    let rows = latencies
        .as_array()
        .ok_or_else(|| ParseError::shape("EMA latencies is not an array"))?;

    let values = rows
        .iter()
        .filter_map(|row| match row.as_array()?.as_slice() {
            [validator, ema] => Some((validator.as_str()?.to_string(), ema.as_f64()?)),
            _ => None,
        })
        .collect();
    Ok((timestamp, values))
}

/// Polls the latency files of the current day
pub struct LatencyPoller {
    latency_dir: PathBuf,
    ema_dir: PathBuf,
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MetricsSink>,
    offsets: HashMap<PathBuf, u64>,
    last_ema: Option<DateTime<Utc>>,
}

impl LatencyPoller {
    pub fn new(
        latency_dir: PathBuf,
        ema_dir: PathBuf,
        resolver: Arc<IdentityResolver>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            latency_dir,
            ema_dir,
            resolver,
            sink,
            offsets: HashMap::new(),
            last_ema: None,
        }
    }

    /// Process the files of `date`
    pub async fn poll_date(&mut self, date: NaiveDate) -> Result<()> {
        let file_name = date.format("%Y%m%d").to_string();
        self.poll_latencies(&file_name).await?;
        self.poll_ema(&file_name).await
    }

    async fn poll_latencies(&mut self, file_name: &str) -> Result<()> {
        let mut entries = match fs::read_dir(&self.latency_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let validator = entry.file_name().to_string_lossy().into_owned();
            if !validator.starts_with("0x") || !entry.file_type().await?.is_dir() {
                continue;
            }

            let path = entry.path().join(file_name);
            match self.read_latest_entry(&path).await {
                Ok(Some(latest)) => {
                    let labels = self.resolver.labels_for(&validator);
                    self.sink
                        .set_validator_latency(&labels, latest.latency, latest.round);
                }
                Ok(None) => {}
                Err(e) => debug!(%validator, error = %e, "cannot read latency file"),
            }
        }

        // offsets of previous days are never read again
        let suffix = Path::new(file_name);
        self.offsets.retain(|path, _| path.ends_with(suffix));
        Ok(())
    }

    /// Newest entry appended to `path` since the last read
    async fn read_latest_entry(&mut self, path: &Path) -> io::Result<Option<LatencyEntry>> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let len = file.metadata().await?.len();
        let mut offset = self.offsets.get(path).copied().unwrap_or(0);
        if offset > len {
            offset = 0;
        }
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        // leave a trailing partial line for the next poll
        let complete = buf.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        self.offsets.insert(path.to_path_buf(), offset + complete as u64);

        let latest = String::from_utf8_lossy(&buf[..complete])
            .lines()
            .filter_map(|line| match serde_json::from_str::<LatencyEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    trace!(error = %e, "skipping latency line");
                    None
                }
            })
            .last();
        Ok(latest)
    }

    async fn poll_ema(&mut self, file_name: &str) -> Result<()> {
        let path = self.ema_dir.join(file_name);
        let line = match read_last_line(&path).await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let (timestamp, values) = parse_ema_line(&line)?;
        if self.last_ema.is_some_and(|last| timestamp <= last) {
            return Ok(());
        }
        self.last_ema = Some(timestamp);

        for (validator, ema) in values {
            if ema >= EMA_NO_DATA {
                continue;
            }
            self.sink
                .set_validator_latency_ema(&self.resolver.labels_for(&validator), ema);
        }
        Ok(())
    }
}

#[async_trait]
impl Poller for LatencyPoller {
    fn name(&self) -> &'static str {
        "latency"
    }

    async fn poll(&mut self) -> Result<()> {
        self.poll_date(Utc::now().date_naive()).await
    }
}
