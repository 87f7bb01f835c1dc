//! Health check and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::state::AppState;

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let breaker = state.upstream.breaker_state().map(|s| s.as_str());

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "queue": {
            "occupancy": state.queue.occupancy(),
            "capacity": state.queue.capacity()
        },
        "scheduler": {
            "interval_ms": state.cadence.current().as_millis() as u64,
            "penalty": state.cadence.in_penalty(),
            "running": state.dispatcher_running.load(Ordering::Acquire)
        },
        "breaker": breaker
    }))
}

/// Metrics endpoint with queue, cache, scheduler and breaker statistics
///
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let queue = state.queue_metrics.snapshot();
    let cache = state.cache.stats();
    let config = &state.config;
    let depth = state.queue.len().await;
    let entries = state.cache.len().await;

    Json(json!({
        "queue": {
            "config": {
                "capacity": config.queue.capacity,
                "admission_wait_ms": config.queue.admission_wait.as_millis() as u64,
                "request_ttl_ms": config.queue.request_ttl.as_millis() as u64
            },
            "current": {
                "occupancy": state.queue.occupancy(),
                "depth": depth
            },
            "totals": queue
        },
        "cache": {
            "config": {
                "max_entries": config.cache.max_entries,
                "ttl_ms": config.cache.ttl.as_millis() as u64
            },
            "entries": entries,
            "stats": cache
        },
        "scheduler": {
            "base_interval_ms": config.scheduler.base_interval.as_millis() as u64,
            "penalty_interval_ms": config.scheduler.penalty_interval().as_millis() as u64,
            "current_interval_ms": state.cadence.current().as_millis() as u64,
            "penalty_threshold_ms": state.cadence.threshold().as_millis() as u64
        },
        "upstream": {
            "url": format!("{}{}", config.upstream.base_url, config.upstream.score_path),
            "timeout_ms": config.upstream.timeout.as_millis() as u64,
            "breaker": state.upstream.breaker_state()
        }
    }))
}

/// Prometheus exposition
///
/// GET /metrics/prometheus
pub async fn metrics_prometheus() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::encode_metrics(),
    )
}

/// Ready check (for Kubernetes)
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.dispatcher_running.load(Ordering::Acquire) && !state.queue.is_closed() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Live check (for Kubernetes)
///
/// GET /live
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}
