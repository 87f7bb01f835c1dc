//! Configuration for the admission queue.

use std::time::Duration;

/// Configuration for the admission queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of requests admitted but not yet dispatched
    pub capacity: usize,

    /// How long an admission may wait for a free slot before it is rejected
    pub admission_wait: Duration,

    /// How long a request stays dispatchable after creation.
    /// Also used as the caller's result-wait budget.
    pub request_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            admission_wait: Duration::from_millis(50),
            request_ttl: Duration::from_secs(10),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCOREGATE_QUEUE_MAX_SIZE") {
            if let Ok(n) = val.parse() {
                config.capacity = n;
            }
        }

        if let Ok(val) = std::env::var("SCOREGATE_QUEUE_OFFER_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                config.admission_wait = Duration::from_millis(n);
            }
        }

        if let Ok(val) = std::env::var("SCOREGATE_REQUEST_TTL_MS") {
            if let Ok(n) = val.parse() {
                config.request_ttl = Duration::from_millis(n);
            }
        }

        config
    }
}
