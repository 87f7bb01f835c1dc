//! Counters for the admission queue and the dispatch loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics for monitoring queue and dispatch behaviour
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Admission attempts
    pub requests_received: AtomicU64,

    /// Requests that got a capacity slot
    pub requests_admitted: AtomicU64,

    /// Requests turned away because no slot freed up in time
    pub requests_rejected: AtomicU64,

    /// Requests handed to the dispatch loop
    pub requests_dispatched: AtomicU64,

    /// Requests discarded at dispatch because their deadline had passed
    pub requests_expired: AtomicU64,

    /// Upstream calls that produced a body
    pub upstream_succeeded: AtomicU64,

    /// Upstream calls that failed
    pub upstream_failed: AtomicU64,

    /// Callers that gave up waiting for their result
    pub requests_timed_out: AtomicU64,

    /// Total queue wait time in milliseconds (for averaging)
    pub total_queue_wait_ms: AtomicU64,

    /// Total upstream round-trip time in milliseconds (for averaging)
    pub total_upstream_ms: AtomicU64,

    /// Maximum queue depth observed
    pub max_queue_depth: AtomicU64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an admission along with the occupancy it produced
    pub fn record_admitted(&self, depth: u64) {
        self.requests_admitted.fetch_add(1, Ordering::Relaxed);
        self.max_queue_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, queue_wait: Duration) {
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
        self.total_queue_wait_ms
            .fetch_add(queue_wait.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.requests_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_succeeded(&self, latency: Duration) {
        self.upstream_succeeded.fetch_add(1, Ordering::Relaxed);
        self.total_upstream_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, latency: Duration) {
        self.upstream_failed.fetch_add(1, Ordering::Relaxed);
        self.total_upstream_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.requests_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Average time between admission and dispatch in milliseconds
    pub fn avg_queue_wait_ms(&self) -> f64 {
        let dispatched = self.requests_dispatched.load(Ordering::Relaxed);
        if dispatched == 0 {
            return 0.0;
        }
        self.total_queue_wait_ms.load(Ordering::Relaxed) as f64 / dispatched as f64
    }

    /// Average upstream round-trip in milliseconds
    pub fn avg_upstream_ms(&self) -> f64 {
        let calls = self.upstream_succeeded.load(Ordering::Relaxed)
            + self.upstream_failed.load(Ordering::Relaxed);
        if calls == 0 {
            return 0.0;
        }
        self.total_upstream_ms.load(Ordering::Relaxed) as f64 / calls as f64
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_admitted: self.requests_admitted.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            requests_expired: self.requests_expired.load(Ordering::Relaxed),
            upstream_succeeded: self.upstream_succeeded.load(Ordering::Relaxed),
            upstream_failed: self.upstream_failed.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            avg_queue_wait_ms: self.avg_queue_wait_ms(),
            avg_upstream_ms: self.avg_upstream_ms(),
        }
    }
}

/// Snapshot of queue metrics at a point in time
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueSnapshot {
    pub requests_received: u64,
    pub requests_admitted: u64,
    pub requests_rejected: u64,
    pub requests_dispatched: u64,
    pub requests_expired: u64,
    pub upstream_succeeded: u64,
    pub upstream_failed: u64,
    pub requests_timed_out: u64,
    pub max_queue_depth: u64,
    pub avg_queue_wait_ms: f64,
    pub avg_upstream_ms: f64,
}
