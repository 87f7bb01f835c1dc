//! Response cache for upstream score bodies.
//!
//! Successful bodies are stored under a normalized key built from the
//! caller's query parameters, so `?b=2&a=1` and `?a=1&b=2` share an entry.
//! The inbound route reads the cache before queuing; the dispatch loop only
//! ever writes to it.
//!
//! ```text
//! Incoming Request
//!        │
//!        ▼
//! ┌──────────────┐
//! │ cache_key()  │ ─── sorted, form-encoded params
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ ExactCache   │ ─── LRU + TTL, xxh3 of the key
//! └──────┬───────┘
//!        │ Miss
//!        ▼
//!   Admission queue
//! ```

mod config;
mod exact;
mod key;
mod metrics;

pub use config::CacheConfig;
pub use exact::ExactCache;
pub use key::cache_key;
pub use metrics::{CacheMetrics, CacheStats};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, size-bounded response cache with time-to-live
pub struct ResponseCache {
    exact: RwLock<ExactCache>,
    metrics: Arc<CacheMetrics>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        let metrics = Arc::new(CacheMetrics::new());
        let exact = RwLock::new(ExactCache::new(
            config.max_entries,
            config.ttl,
            metrics.clone(),
        ));

        Self {
            exact,
            metrics,
            config,
        }
    }

    /// Look up a fresh body for a normalized key
    pub async fn get(&self, key: &str) -> Option<String> {
        // LRU lookups reorder entries, so even reads need the write lock
        let hit = self.exact.write().await.get(key);
        match hit {
            Some(body) => {
                self.metrics.record_hit();
                tracing::debug!(key = %key, "Cache hit");
                Some(body)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Store a body under a normalized key
    pub async fn put(&self, key: &str, body: String) {
        let len = {
            let mut exact = self.exact.write().await;
            exact.put(key, body);
            exact.len()
        };
        crate::metrics::set_cache_size(len as u64);
    }

    pub async fn len(&self) -> usize {
        self.exact.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.exact.read().await.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    pub async fn clear(&self) {
        self.exact.write().await.clear();
        self.metrics.reset();
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
