//! Home validator detection from the newest status log line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Poller;
use crate::event::{parse_status_record, StatusRecord};
use crate::identity::{normalize, IdentityResolver, MappingSource};
use crate::sink::MetricsSink;
use crate::tail::{latest_file, read_last_line};
use crate::Result;

/// Status files older than this mean the node is no longer validating
pub const STATUS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// The node's own validator and where its address came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeValidator {
    pub address: String,
    pub source: MappingSource,
}

/// Register every `current_stakes` row as a signer mapping. Returns the count.
pub fn register_stakes(record: &StatusRecord, resolver: &IdentityResolver) -> usize {
    for row in &record.current_stakes {
        resolver.register_signer_mapping(&row.signer, &row.validator);
        resolver.register_full_address(&row.validator);
    }
    record.current_stakes.len()
}

/// Resolve the home validator from a status record.
///
/// `home_validator` is a signer. Its validator is taken from the record's own
/// stake table first, then from any mapping the resolver already holds (in
/// practice learned from the API), and finally the signer stands in for itself.
pub fn resolve_home(record: &StatusRecord, resolver: &IdentityResolver) -> Option<HomeValidator> {
    let home_signer = normalize(record.home_validator.as_deref()?);

    if let Some(row) = record
        .current_stakes
        .iter()
        .find(|row| normalize(&row.signer) == home_signer)
    {
        return Some(HomeValidator {
            address: normalize(&row.validator),
            source: MappingSource::Local,
        });
    }

    if let Some(validator) = resolver.validator_for_signer(&home_signer) {
        return Some(HomeValidator {
            address: validator,
            source: MappingSource::Api,
        });
    }

    Some(HomeValidator {
        address: home_signer,
        source: MappingSource::Signer,
    })
}

/// Pre-populate signer mappings from the newest status line, once at startup.
/// Every failure is logged and yields 0; the pollers fill mappings in later.
pub async fn populate_signer_mappings(status_dir: &Path, resolver: &IdentityResolver) -> usize {
    let latest = match latest_file(status_dir).await {
        Ok(Some(latest)) => latest,
        Ok(None) => {
            info!(dir = %status_dir.display(), "no status logs, mappings will come from the API");
            return 0;
        }
        Err(e) => {
            warn!(error = %e, "cannot scan status logs for signer mappings");
            return 0;
        }
    };

    let line = match read_last_line(&latest.path).await {
        Ok(Some(line)) => line,
        Ok(None) => return 0,
        Err(e) => {
            warn!(file = %latest.path.display(), error = %e, "cannot read status file");
            return 0;
        }
    };

    match parse_status_record(&line) {
        Ok(record) => register_stakes(&record, resolver),
        Err(e) => {
            warn!(error = %e, "cannot parse status line for signer mappings");
            0
        }
    }
}

/// Periodically reports whether this node is a validator, and which one
pub struct ValidatorStatusPoller {
    status_dir: PathBuf,
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MetricsSink>,
    max_age: Duration,
    last: Option<HomeValidator>,
}

impl ValidatorStatusPoller {
    pub fn new(status_dir: PathBuf, resolver: Arc<IdentityResolver>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            status_dir,
            resolver,
            sink,
            max_age: STATUS_MAX_AGE,
            last: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Home validator reported by the last poll
    pub fn current(&self) -> Option<&HomeValidator> {
        self.last.as_ref()
    }

    fn report_not_validator(&mut self) {
        self.sink.set_is_validator(false);
        self.sink.set_validator_address("");
        if self.last.take().is_some() {
            info!("no validator address found");
        }
    }

    /// Read the newest status line, or `None` when the node is not validating
    async fn current_record(&self) -> Option<StatusRecord> {
        let latest = match latest_file(&self.status_dir).await {
            Ok(Some(latest)) => latest,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "cannot scan status logs");
                return None;
            }
        };

        let age = SystemTime::now()
            .duration_since(latest.modified)
            .unwrap_or_default();
        if age > self.max_age {
            debug!(file = %latest.path.display(), ?age, "status file is stale");
            return None;
        }

        let line = match read_last_line(&latest.path).await {
            Ok(Some(line)) => line,
            Ok(None) => return None,
            Err(e) => {
                warn!(file = %latest.path.display(), error = %e, "cannot read status file");
                return None;
            }
        };

        match parse_status_record(&line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "cannot parse validator status line");
                None
            }
        }
    }
}

#[async_trait]
impl Poller for ValidatorStatusPoller {
    fn name(&self) -> &'static str {
        "validator_status"
    }

    async fn poll(&mut self) -> Result<()> {
        let Some(record) = self.current_record().await else {
            self.report_not_validator();
            return Ok(());
        };

        register_stakes(&record, &self.resolver);

        let Some(home) = resolve_home(&record, &self.resolver) else {
            self.report_not_validator();
            return Ok(());
        };

        self.resolver.register_full_address(&home.address);
        self.sink.set_validator_address(&home.address);
        self.sink.set_is_validator(true);

        if self.last.as_ref() != Some(&home) {
            info!(
                address = %home.address,
                source = home.source.as_str(),
                signer = record.home_validator.as_deref().unwrap_or_default(),
                "found validator address"
            );
        }
        self.last = Some(home);
        Ok(())
    }
}
