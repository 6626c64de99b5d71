use std::thread::sleep;
use std::time::Duration;

use proptest::prelude::*;

use hl_exporter::cache::{CacheConfig, TtlCache};

#[test]
fn test_lru_eviction_order() {
    let cache = TtlCache::new(CacheConfig::new(2, Duration::ZERO));
    assert_eq!(cache.insert("a", 1), None);
    assert_eq!(cache.insert("b", 2), None);

    // touching "a" makes "b" the eviction candidate
    assert_eq!(cache.get(&"a"), Some(1));
    assert_eq!(cache.insert("c", 3), Some("b"));

    assert!(cache.contains(&"a"));
    assert!(!cache.contains(&"b"));
    assert!(cache.contains(&"c"));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_update_does_not_evict() {
    let cache = TtlCache::new(CacheConfig::new(2, Duration::ZERO));
    cache.insert("a", 1);
    cache.insert("b", 2);
    assert_eq!(cache.insert("a", 10), None);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.peek(&"a"), Some(10));
}

#[test]
fn test_expired_entries_miss_and_purge() {
    let cache = TtlCache::new(CacheConfig::new(10, Duration::from_millis(20)));
    cache.insert("a", 1);
    cache.insert("b", 2);
    assert_eq!(cache.get(&"a"), Some(1));

    sleep(Duration::from_millis(40));

    assert_eq!(cache.get(&"a"), None);
    assert!(!cache.contains(&"b"));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.purge_expired(), 1);
    assert!(cache.is_empty());

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 2);
}

#[test]
fn test_zero_ttl_never_expires() {
    let cache = TtlCache::new(CacheConfig::new(10, Duration::ZERO));
    assert_eq!(cache.ttl(), None);
    cache.insert(1u32, "one");
    assert_eq!(cache.purge_expired(), 0);
    assert_eq!(cache.get(&1), Some("one"));
}

#[test]
fn test_zero_capacity_holds_one() {
    let cache = TtlCache::new(CacheConfig::new(0, Duration::ZERO));
    assert_eq!(cache.capacity(), 1);
    cache.insert(1u32, 1u32);
    cache.insert(2, 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.peek(&2), Some(2));
}

proptest! {
    #[test]
    fn test_len_never_exceeds_capacity(
        capacity in 1usize..16,
        keys in prop::collection::vec(0u32..64, 0..200),
    ) {
        let cache = TtlCache::new(CacheConfig::new(capacity, Duration::ZERO));
        for key in keys {
            cache.insert(key, key);
            prop_assert!(cache.len() <= capacity);
        }
        prop_assert_eq!(cache.entries().len(), cache.len());
    }

    #[test]
    fn test_last_write_wins(key in 0u32..8, values in prop::collection::vec(any::<u32>(), 1..20)) {
        let cache = TtlCache::new(CacheConfig::new(4, Duration::ZERO));
        for value in &values {
            cache.insert(key, *value);
        }
        prop_assert_eq!(cache.get(&key), values.last().copied());
    }
}

proptest! {
    #[test]
    fn test_overflow_evicts_least_recently_used(capacity in 1usize..10, k in 0usize..10, touch in any::<bool>()) {
        let cache = TtlCache::new(CacheConfig::new(capacity, Duration::ZERO));
        for key in 0..capacity {
            cache.insert(key, key);
        }
        // reading key 0 makes it the most recently used
        if touch {
            cache.get(&0);
        }

        let mut evicted = Vec::new();
        for key in capacity..capacity + k {
            evicted.extend(cache.insert(key, key));
        }

        let mut order: Vec<usize> = (0..capacity).collect();
        if touch {
            order.rotate_left(1);
        }
        order.extend(capacity..capacity + k);

        prop_assert_eq!(cache.len(), capacity);
        prop_assert_eq!(&evicted, &order[..k]);
        prop_assert_eq!(cache.stats().evictions, k as u64);
    }
}
