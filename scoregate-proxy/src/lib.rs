//! Scoregate Proxy Library
//!
//! Rate-limited gateway in front of a scoring service.
//!
//! Callers hit `GET /proxy/score`; answers already in the cache are served
//! directly, everything else goes through a bounded priority queue drained by
//! a single dispatch loop that paces calls to the upstream and slows down
//! when the upstream does.

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod cache;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod upstream;

pub use error::ProxyError;
pub use state::{AppState, ProxyConfig};

/// Server configuration for the proxy
///
/// Fields left as `None` fall back to the environment (`SCOREGATE_*`) and
/// then to built-in defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: Option<u16>,
    /// Base URL of the scoring service
    pub upstream_url: Option<String>,
    /// Whether to print the banner on startup
    pub print_banner: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            upstream_url: None,
            print_banner: true,
        }
    }
}

impl From<ServerConfig> for ProxyConfig {
    fn from(config: ServerConfig) -> Self {
        let mut proxy = ProxyConfig::from_env();
        if let Some(port) = config.port {
            proxy.port = port;
        }
        if let Some(url) = config.upstream_url {
            proxy.upstream.base_url = url.trim_end_matches('/').to_string();
        }
        proxy
    }
}

/// Initialize Prometheus metrics registry.
/// Should be called once before starting the server.
pub fn init_metrics() {
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register Prometheus metrics: {}", e);
    }
}

/// Build the HTTP router around shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Score endpoint
        .route("/proxy/score", get(routes::score))
        // Health endpoints
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        .route("/live", get(routes::live))
        .route("/metrics", get(routes::metrics))
        .route("/metrics/prometheus", get(routes::metrics_prometheus))
        // Middleware
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the dispatch loop for `state`; it stops once `shutdown` turns true
pub fn spawn_dispatcher(state: &AppState, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    state.dispatcher().spawn(shutdown)
}

/// Run the scoregate proxy server.
///
/// This function starts the HTTP server and the dispatch loop, and blocks
/// until a shutdown signal (Ctrl-C or SIGTERM) has been handled.
///
/// # Example
/// ```no_run
/// use scoregate_proxy::{run_server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig {
///         port: Some(8080),
///         ..Default::default()
///     };
///     run_server(config).await
/// }
/// ```
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    // Initialize Prometheus metrics
    init_metrics();

    let print_banner = config.print_banner;
    let proxy_config = ProxyConfig::from(config);

    info!(
        port = proxy_config.port,
        upstream = %proxy_config.upstream.base_url,
        "Starting Scoregate Proxy v{}",
        env!("CARGO_PKG_VERSION")
    );
    if !proxy_config.upstream.has_default_client_id() {
        warn!("No default client id configured; callers must send x-client-id or clientId");
    }

    // Create application state
    let state = Arc::new(AppState::new(proxy_config.clone())?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = spawn_dispatcher(&state, shutdown_rx);

    let app = build_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", proxy_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Scoregate Proxy listening on http://{}", addr);
    info!("Score API: http://{}/proxy/score", addr);
    info!("Health:    http://{}/health", addr);

    if print_banner {
        print_banner_for(&proxy_config);
    }

    let queue = state.queue.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown requested, closing admission queue");
            queue.close();
            let _ = shutdown_tx.send(true);
        })
        .await?;

    dispatcher.await?;
    info!("Scoregate Proxy stopped");

    Ok(())
}

/// Resolve on Ctrl-C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print the startup banner
fn print_banner_for(config: &ProxyConfig) {
    let addr = format!("0.0.0.0:{}", config.port);

    println!();
    println!("==================================================");
    println!("  Scoregate Proxy v{}", env!("CARGO_PKG_VERSION"));
    println!("==================================================");
    println!("  Listening on: http://{}", addr);
    println!(
        "  Upstream: {}{}",
        config.upstream.base_url, config.upstream.score_path
    );
    println!(
        "  Default client id: {}",
        if config.upstream.has_default_client_id() {
            "configured"
        } else {
            "none"
        }
    );
    println!();
    println!("  Queue configuration:");
    println!("    Capacity: {}", config.queue.capacity);
    println!(
        "    Admission wait: {}ms, request TTL: {}ms",
        config.queue.admission_wait.as_millis(),
        config.queue.request_ttl.as_millis()
    );
    println!();
    println!("  Scheduler configuration:");
    println!(
        "    Interval: {}ms (penalty {}ms)",
        config.scheduler.base_interval.as_millis(),
        config.scheduler.penalty_interval().as_millis()
    );
    println!();
    println!("  Cache configuration:");
    println!(
        "    {} entries, TTL {}ms",
        config.cache.max_entries,
        config.cache.ttl.as_millis()
    );
    println!();
    println!("  Endpoints:");
    println!("    Score:  GET /proxy/score (x-client-id, x-priority)");
    println!("    Health: GET /health, /ready, /live, /metrics");
    println!("    Prometheus: GET /metrics/prometheus");
    println!("==================================================");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_overrides() {
        let config = ServerConfig {
            port: Some(9191),
            upstream_url: Some("http://localhost:7000/".to_string()),
            print_banner: false,
        };
        let proxy = ProxyConfig::from(config);
        assert_eq!(proxy.port, 9191);
        assert_eq!(proxy.upstream.base_url, "http://localhost:7000");
    }
}
