//! Metrics module for the scoregate proxy
//!
//! Provides Prometheus metrics for monitoring and observability.

pub mod prometheus;

// Re-export commonly used items
pub use self::prometheus::{
    encode_metrics, record_cache_hit, record_cache_miss, record_drop, record_enqueued,
    record_queue_wait, record_upstream, register_metrics, set_breaker_state, set_cache_size,
    set_queue_size, set_scheduler_interval,
};
