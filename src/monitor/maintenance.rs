//! Cache expiry and cache size reporting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Poller;
use crate::identity::IdentityResolver;
use crate::sink::MetricsSink;
use crate::Result;

pub struct Maintenance {
    resolver: Arc<IdentityResolver>,
    sink: Arc<dyn MetricsSink>,
}

impl Maintenance {
    pub fn new(resolver: Arc<IdentityResolver>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { resolver, sink }
    }
}

#[async_trait]
impl Poller for Maintenance {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    async fn poll(&mut self) -> Result<()> {
        let purged = self.resolver.purge_expired();

        let stats = self.resolver.stats();
        self.sink.set_cache_entries("signers", stats.signers.entries);
        self.sink.set_cache_entries("validators", stats.validators.entries);
        self.sink.set_cache_entries("addresses", stats.addresses.entries);

        debug!(
            purged,
            signers = stats.signers.entries,
            validators = stats.validators.entries,
            addresses = stats.addresses.entries,
            "maintenance"
        );
        Ok(())
    }
}
