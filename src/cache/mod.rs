use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of resident entries
    pub capacity: usize,
    /// Entry lifetime. `Duration::ZERO` disables expiry.
    pub ttl: Duration,
}

impl CacheConfig {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { capacity, ttl }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 5_000,
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of resident entries (expired entries not yet purged included)
    pub entries: usize,
    /// Number of lookups that found a live entry
    pub hits: u64,
    /// Number of lookups that found nothing or an expired entry
    pub misses: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Thread-safe LRU cache with an optional per-entry TTL.
///
/// A single reader/writer lock guards the whole cache. `peek`, `contains`
/// and `len` take the shared lock; `get` takes the exclusive lock because a
/// hit promotes the entry to most-recently-used.
pub struct TtlCache<K, V> {
    inner: RwLock<LruCache<K, CacheEntry<V>>>,
    ttl: Option<Duration>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        let ttl = (!config.ttl.is_zero()).then_some(config.ttl);
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
            ttl,
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut cache = self.inner.write();

        let expired = match cache.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            None => false,
        };

        if expired {
            cache.pop(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Look up a key without touching its recency
    pub fn peek(&self, key: &K) -> Option<V> {
        let cache = self.inner.read();
        cache
            .peek(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Insert or update an entry, refreshing its TTL and recency.
    /// Returns the key evicted to make room, if any.
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        let entry = CacheEntry {
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };

        let mut cache = self.inner.write();
        match cache.push(key.clone(), entry) {
            // `push` hands back the old entry when the key was already resident
            Some((old_key, _)) if old_key != key => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                Some(old_key)
            }
            _ => None,
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.write().pop(key).map(|entry| entry.value)
    }

    /// Number of resident entries, including expired entries not yet purged
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }

        let now = Instant::now();
        let mut cache = self.inner.write();
        let expired: Vec<K> = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            cache.pop(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Snapshot of all live entries, most-recently-used first
    pub fn entries(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        self.inner
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
