//! Configuration for the response cache.

use std::time::Duration;

/// Configuration for the response cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached bodies
    pub max_entries: usize,

    /// Time-to-live for cached bodies, measured from the write
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCOREGATE_CACHE_MAX_SIZE") {
            if let Ok(n) = val.parse() {
                config.max_entries = n;
            }
        }

        if let Ok(val) = std::env::var("SCOREGATE_CACHE_TTL_MS") {
            if let Ok(n) = val.parse() {
                config.ttl = Duration::from_millis(n);
            }
        }

        config
    }
}
