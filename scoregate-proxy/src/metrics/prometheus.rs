//! Prometheus metrics for the scoregate proxy
//!
//! Exposes metrics in Prometheus format for monitoring and observability.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

use crate::upstream::BreakerState;

lazy_static! {
    /// Global Prometheus registry for scoregate metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // ============== Queue Metrics ==============

    /// Current queue size gauge
    pub static ref QUEUE_SIZE: Gauge = Gauge::with_opts(
        Opts::new("queue_size", "Current number of requests waiting for dispatch")
            .namespace("scoregate")
    ).expect("metric can be created");

    /// Requests admitted into the queue
    pub static ref QUEUE_ENQUEUED_TOTAL: Counter = Counter::with_opts(
        Opts::new("queue_enqueued_total", "Total requests admitted into the queue")
            .namespace("scoregate")
    ).expect("metric can be created");

    /// Requests dropped, labelled by reason (full, timeout, ttl)
    pub static ref QUEUE_DROPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("queue_dropped_total", "Total requests dropped before an answer")
            .namespace("scoregate"),
        &["reason"]
    ).expect("metric can be created");

    /// Queue wait time histogram
    pub static ref QUEUE_WAIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "queue_wait_seconds",
            "Time spent waiting in queue"
        )
        .namespace("scoregate")
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).expect("metric can be created");

    // ============== Cache Metrics ==============

    pub static ref CACHE_HITS_TOTAL: Counter = Counter::with_opts(
        Opts::new("cache_hits_total", "Total cache hits")
            .namespace("scoregate")
    ).expect("metric can be created");

    pub static ref CACHE_MISSES_TOTAL: Counter = Counter::with_opts(
        Opts::new("cache_misses_total", "Total cache misses")
            .namespace("scoregate")
    ).expect("metric can be created");

    /// Cache size gauge (number of entries)
    pub static ref CACHE_SIZE: Gauge = Gauge::with_opts(
        Opts::new("cache_size", "Current cache size (entries)")
            .namespace("scoregate")
    ).expect("metric can be created");

    // ============== Upstream Metrics ==============

    /// Upstream calls with outcome label (success, error)
    pub static ref UPSTREAM_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("upstream_calls_total", "Total upstream calls")
            .namespace("scoregate"),
        &["outcome"]
    ).expect("metric can be created");

    /// Upstream latency histogram with outcome label
    pub static ref UPSTREAM_LATENCY_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "upstream_latency_seconds",
            "Upstream round-trip time in seconds"
        )
        .namespace("scoregate")
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0]),
        &["outcome"]
    ).expect("metric can be created");

    /// Circuit breaker state (0 = closed, 1 = half-open, 2 = open)
    pub static ref BREAKER_STATE: Gauge = Gauge::with_opts(
        Opts::new("breaker_state", "Circuit breaker state (0=closed, 1=half-open, 2=open)")
            .namespace("scoregate")
    ).expect("metric can be created");

    // ============== Scheduler Metrics ==============

    /// Current delay between dispatches
    pub static ref SCHEDULER_INTERVAL_MS: Gauge = Gauge::with_opts(
        Opts::new("scheduler_interval_ms", "Current delay between dispatches in milliseconds")
            .namespace("scoregate")
    ).expect("metric can be created");
}

/// Register all metrics with the global registry.
/// Should be called once at startup.
pub fn register_metrics() -> prometheus::Result<()> {
    // Queue metrics
    REGISTRY.register(Box::new(QUEUE_SIZE.clone()))?;
    REGISTRY.register(Box::new(QUEUE_ENQUEUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DROPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_WAIT_SECONDS.clone()))?;

    // Cache metrics
    REGISTRY.register(Box::new(CACHE_HITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_MISSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_SIZE.clone()))?;

    // Upstream metrics
    REGISTRY.register(Box::new(UPSTREAM_CALLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UPSTREAM_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(BREAKER_STATE.clone()))?;

    // Scheduler metrics
    REGISTRY.register(Box::new(SCHEDULER_INTERVAL_MS.clone()))?;

    Ok(())
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# Error encoding metrics: {}", e))
}

/// Record a request admitted into the queue.
pub fn record_enqueued() {
    QUEUE_ENQUEUED_TOTAL.inc();
}

/// Record a dropped request (`full`, `timeout` or `ttl`).
pub fn record_drop(reason: &str) {
    QUEUE_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Update queue size gauge.
pub fn set_queue_size(size: u64) {
    QUEUE_SIZE.set(size as f64);
}

/// Record queue wait time.
pub fn record_queue_wait(wait_secs: f64) {
    QUEUE_WAIT_SECONDS.observe(wait_secs);
}

pub fn record_cache_hit() {
    CACHE_HITS_TOTAL.inc();
}

pub fn record_cache_miss() {
    CACHE_MISSES_TOTAL.inc();
}

/// Update cache size gauge.
pub fn set_cache_size(size: u64) {
    CACHE_SIZE.set(size as f64);
}

/// Record one finished upstream call.
pub fn record_upstream(outcome: &str, latency_secs: f64) {
    UPSTREAM_CALLS_TOTAL.with_label_values(&[outcome]).inc();
    UPSTREAM_LATENCY_SECONDS
        .with_label_values(&[outcome])
        .observe(latency_secs);
}

pub fn set_breaker_state(state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    BREAKER_STATE.set(value);
}

/// Update the dispatch interval gauge.
pub fn set_scheduler_interval(interval_ms: u64) {
    SCHEDULER_INTERVAL_MS.set(interval_ms as f64);
}
