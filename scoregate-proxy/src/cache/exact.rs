//! Exact-key cache using LRU eviction and TTL expiration.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xxhash_rust::xxh3::xxh3_64;

use super::metrics::CacheMetrics;

/// A cached body with timestamp for TTL checking
struct CachedEntry {
    /// Full key, kept to rule out hash collisions
    key: String,
    body: String,
    created_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Exact-key cache with hash-based lookup.
///
/// Keys are hashed with xxh3; entries are evicted least-recently-used first
/// once the cache is full and dropped lazily once older than the TTL.
pub struct ExactCache {
    cache: LruCache<u64, CachedEntry>,
    ttl: Duration,
    metrics: Arc<CacheMetrics>,
}

impl ExactCache {
    pub fn new(capacity: usize, ttl: Duration, metrics: Arc<CacheMetrics>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            ttl,
            metrics,
        }
    }

    fn hash_key(key: &str) -> u64 {
        xxh3_64(key.as_bytes())
    }

    /// Fresh body for `key`, if any
    pub fn get(&mut self, key: &str) -> Option<String> {
        let hash = Self::hash_key(key);

        let expired = match self.cache.get(&hash) {
            Some(entry) if entry.key != key => return None,
            Some(entry) if !entry.is_expired(self.ttl) => return Some(entry.body.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.cache.pop(&hash);
            self.metrics.record_expiration();
        }
        None
    }

    /// Store a body, evicting the least recently used entry when full
    pub fn put(&mut self, key: &str, body: String) {
        let hash = Self::hash_key(key);
        let entry = CachedEntry {
            key: key.to_string(),
            body,
            created_at: Instant::now(),
        };

        if let Some((evicted, _)) = self.cache.push(hash, entry) {
            if evicted != hash {
                self.metrics.record_eviction();
            }
        }
        self.metrics.record_put();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
