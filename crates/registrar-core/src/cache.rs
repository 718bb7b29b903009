//! # Token Cache
//!
//! A small LRU cache used by the server to resolve bearer tokens without
//! scanning every user on each request.
//!
//! Keys are token hashes, never plaintext tokens. A hit only names the user.
//! The caller still loads the user and re-checks the stored hash, so a
//! revoked or rotated token stops working even while it is cached.
//!
//! Recency uses a logical clock (a monotonic counter), not wall time, so
//! eviction order is deterministic.

use crate::primitives::UserId;
use std::collections::BTreeMap;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Default maximum number of cached tokens.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Default number of entries dropped when the cache is full.
pub const DEFAULT_EVICTION_BATCH: usize = 64;

// =============================================================================
// LRU CACHE
// =============================================================================

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    /// Logical time of the last read or write.
    used_at: u64,
}

/// Least-recently-used cache over a `BTreeMap`.
#[derive(Debug)]
pub struct LruCache<K: Ord + Clone, V: Clone> {
    slots: BTreeMap<K, Slot<V>>,
    capacity: usize,
    eviction_batch: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl<K: Ord + Clone, V: Clone> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

impl<K: Ord + Clone, V: Clone> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            capacity: capacity.max(1),
            eviction_batch: DEFAULT_EVICTION_BATCH,
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Set how many entries are dropped at once when full.
    #[must_use]
    pub fn with_eviction_batch(mut self, batch: usize) -> Self {
        self.eviction_batch = batch.max(1);
        self
    }

    fn tick(&mut self) -> u64 {
        self.clock = self.clock.saturating_add(1);
        self.clock
    }

    /// Look up a key, marking it as recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = self.tick();
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.used_at = now;
                self.hits = self.hits.saturating_add(1);
                Some(&slot.value)
            }
            None => {
                self.misses = self.misses.saturating_add(1);
                None
            }
        }
    }

    /// Insert or replace a value, evicting old entries when full.
    pub fn insert(&mut self, key: K, value: V) {
        let now = self.tick();
        if self.slots.len() >= self.capacity && !self.slots.contains_key(&key) {
            self.evict();
        }
        self.slots.insert(key, Slot { value, used_at: now });
    }

    /// Remove one key.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.slots.remove(key).map(|slot| slot.value)
    }

    /// Remove every entry whose value matches `predicate`.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&V) -> bool) {
        self.slots.retain(|_, slot| !predicate(&slot.value));
    }

    /// Drop everything. Statistics are kept.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `key` is cached (does not count as a use).
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Hit/miss statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits.saturating_add(self.misses);
        let hit_rate_percent = if lookups == 0 {
            0
        } else {
            (self.hits.saturating_mul(100) / lookups) as u8
        };
        CacheStats {
            size: self.slots.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            hit_rate_percent,
        }
    }

    fn evict(&mut self) {
        let mut by_age: Vec<(u64, K)> = self
            .slots
            .iter()
            .map(|(key, slot)| (slot.used_at, key.clone()))
            .collect();
        by_age.sort_by_key(|(used_at, _)| *used_at);
        for (_, key) in by_age.into_iter().take(self.eviction_batch) {
            self.slots.remove(&key);
        }
    }
}

/// Cache performance counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of entries.
    pub size: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Integer hit rate (0-100).
    pub hit_rate_percent: u8,
}

// =============================================================================
// TOKEN CACHE
// =============================================================================

/// Token hash -> owning user.
pub type TokenCache = LruCache<String, UserId>;

/// Create a token cache holding at most `size` entries.
#[must_use]
pub fn token_cache(size: usize) -> TokenCache {
    LruCache::new(size).with_eviction_batch((size / 16).max(1))
}

/// Drop every cached token of `user`.
pub fn forget_user(cache: &mut TokenCache, user: UserId) {
    cache.remove_where(|owner| *owner == user);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut cache = LruCache::new(10);
        cache.insert(1u64, "one");
        cache.insert(2u64, "two");

        assert_eq!(cache.get(&1), Some(&"one"));
        assert_eq!(cache.get(&3), None);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(3).with_eviction_batch(1);
        cache.insert(1u64, "a");
        cache.insert(2u64, "b");
        cache.insert(3u64, "c");

        let _ = cache.get(&1);
        let _ = cache.get(&2);
        cache.insert(4u64, "d");

        assert!(cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(!cache.contains(&3));
        assert!(cache.contains(&4));
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let mut cache = LruCache::<u64, &str>::new(10);
        cache.insert(1, "a");
        let _ = cache.get(&1);
        let _ = cache.get(&2);
        let _ = cache.get(&1);
        let _ = cache.get(&3);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_rate_percent, 50);
    }

    #[test]
    fn replacing_keeps_one_entry() {
        let mut cache = LruCache::new(10);
        cache.insert(1u64, "old");
        cache.insert(1u64, "new");
        assert_eq!(cache.get(&1), Some(&"new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn token_cache_forgets_user() {
        let mut cache = token_cache(8);
        cache.insert("hash-a".to_string(), UserId(1));
        cache.insert("hash-b".to_string(), UserId(1));
        cache.insert("hash-c".to_string(), UserId(2));

        forget_user(&mut cache, UserId(1));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"hash-c".to_string()), Some(&UserId(2)));
    }

    #[test]
    fn token_cache_is_bounded() {
        let mut cache = token_cache(4);
        for n in 0..10u64 {
            cache.insert(format!("hash-{n}"), UserId(n));
        }
        assert!(cache.len() <= 4);
        assert!(cache.contains(&"hash-9".to_string()));
    }
}
