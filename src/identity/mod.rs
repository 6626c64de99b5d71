/*!
# Identity Module

Resolves the ephemeral signer identities that appear on votes, QCs and
heartbeats to the stake-bearing validator they act for, and recovers full
addresses from the truncated `0x1234..5678` form some logs print.

The resolver is constructed once at startup and shared by every worker through
an `Arc`. It owns three bounded TTL caches:
- signer -> validator
- validator -> `ValidatorInfo` (signer and moniker)
- truncated address -> full address

All keys are full lowercase addresses. Any truncated input is expanded before
any other lookup. Writes are last-write-wins regardless of which source (local
status file or remote API) supplied them; callers that need a precedence policy
implement it at the call site.
*/

pub mod address;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

use crate::cache::{CacheConfig, CacheStats, TtlCache};

pub use address::{is_full, is_truncated, normalize, truncate};

/// Name reported for identities without a known moniker
pub const UNKNOWN_NAME: &str = "unknown";

/// Identity resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Capacity of the signer and validator-info caches
    pub capacity: usize,
    /// Entry lifetime in seconds, 0 disables expiry
    pub ttl_secs: u64,
    /// Capacity of the truncated-address expansion cache
    pub address_capacity: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            capacity: 5_000,
            ttl_secs: 24 * 60 * 60,
            address_capacity: 10_000,
        }
    }
}

/// Signer and moniker registered for a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub signer: String,
    pub moniker: String,
}

/// Where a signer mapping was learned from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingSource {
    /// Node's own status log
    Local,
    /// Remote validator summaries API
    Api,
    /// No mapping known, the signer address stands in for the validator
    Signer,
}

impl MappingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingSource::Local => "local",
            MappingSource::Api => "api",
            MappingSource::Signer => "signer",
        }
    }
}

/// Label triple attached to every per-validator metric
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorLabels {
    pub validator: String,
    pub signer: String,
    pub name: String,
}

impl ValidatorLabels {
    /// Labels for an address nothing is known about
    pub fn unresolved(address: &str) -> Self {
        Self {
            validator: address.to_string(),
            signer: address.to_string(),
            name: UNKNOWN_NAME.to_string(),
        }
    }
}

/// Shared signer/validator identity service
pub struct IdentityResolver {
    signers: TtlCache<String, String>,
    validators: TtlCache<String, ValidatorInfo>,
    addresses: TtlCache<String, String>,
}

impl IdentityResolver {
    pub fn new(config: &IdentityConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        Self {
            signers: TtlCache::new(CacheConfig::new(config.capacity, ttl)),
            validators: TtlCache::new(CacheConfig::new(config.capacity, ttl)),
            addresses: TtlCache::new(CacheConfig::new(config.address_capacity, ttl)),
        }
    }

    /// Record that `signer` signs for `validator`
    pub fn register_signer_mapping(&self, signer: &str, validator: &str) {
        let signer = self.key(signer);
        let validator = self.key(validator);
        if signer.is_empty() || validator.is_empty() {
            return;
        }
        trace!(%signer, %validator, "register signer mapping");
        self.signers.insert(signer, validator);
    }

    /// Validator address for a signer, if one has been registered
    pub fn validator_for_signer(&self, signer: &str) -> Option<String> {
        self.signers.get(&self.key(signer))
    }

    /// Record the signer and moniker of `validator`
    pub fn register_validator_info(&self, validator: &str, signer: &str, moniker: &str) {
        let validator = self.key(validator);
        if validator.is_empty() {
            return;
        }
        self.validators.insert(
            validator,
            ValidatorInfo {
                signer: self.key(signer),
                moniker: moniker.to_string(),
            },
        );
    }

    pub fn validator_info(&self, validator: &str) -> Option<ValidatorInfo> {
        self.validators.get(&self.key(validator))
    }

    /// Remember a full address so its truncated form can be expanded later.
    /// Inputs shorter than a full address are ignored.
    pub fn register_full_address(&self, full_address: &str) {
        let full = normalize(full_address);
        if !is_full(&full) {
            return;
        }
        self.addresses.insert(truncate(&full), full);
    }

    /// Full form of a truncated address when known. Input that is not in the
    /// truncated form, or whose full form was never seen, is returned as is.
    pub fn expand_address(&self, address: &str) -> String {
        if !is_truncated(address) {
            return address.to_string();
        }
        self.addresses
            .get(&normalize(address))
            .unwrap_or_else(|| address.to_string())
    }

    /// Cache key for an address: expanded, then lowercased
    fn key(&self, address: &str) -> String {
        normalize(&self.expand_address(address.trim()))
    }

    /// Resolve the metric labels for a signer or validator address.
    ///
    /// A known signer resolves to its validator; an address with registered
    /// info is treated as the validator itself; anything else is reported
    /// under its own address with an unknown name.
    pub fn labels_for(&self, address: &str) -> ValidatorLabels {
        let address = self.key(address);

        if let Some(validator) = self.signers.get(&address) {
            return match self.validators.get(&validator) {
                Some(info) => ValidatorLabels {
                    validator,
                    signer: info.signer,
                    name: info.moniker,
                },
                None => ValidatorLabels {
                    validator,
                    signer: address,
                    name: UNKNOWN_NAME.to_string(),
                },
            };
        }

        match self.validators.get(&address) {
            Some(info) => ValidatorLabels {
                validator: address,
                signer: info.signer,
                name: info.moniker,
            },
            None => ValidatorLabels::unresolved(&address),
        }
    }

    /// Validator for a signer, falling back to the (expanded) signer itself
    pub fn resolve_or_self(&self, signer: &str) -> String {
        self.validator_for_signer(signer)
            .unwrap_or_else(|| self.key(signer))
    }

    /// Drop expired entries from every cache
    pub fn purge_expired(&self) -> usize {
        self.signers.purge_expired()
            + self.validators.purge_expired()
            + self.addresses.purge_expired()
    }

    pub fn stats(&self) -> IdentityStats {
        IdentityStats {
            signers: self.signers.stats(),
            validators: self.validators.stats(),
            addresses: self.addresses.stats(),
        }
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(&IdentityConfig::default())
    }
}

/// Per-cache statistics of the resolver
#[derive(Debug, Clone, Default)]
pub struct IdentityStats {
    pub signers: CacheStats,
    pub validators: CacheStats,
    pub addresses: CacheStats,
}
