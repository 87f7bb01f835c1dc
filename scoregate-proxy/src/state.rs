//! Application state for the scoregate proxy.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::cache::{CacheConfig, ResponseCache};
use crate::error::ProxyError;
use crate::queue::{AdmissionQueue, QueueConfig, QueueMetrics};
use crate::scheduler::{Cadence, Dispatcher, SchedulerConfig};
use crate::upstream::{ScoreClient, ScoreGateway, UpstreamConfig};

/// Application state shared across all handlers
pub struct AppState {
    /// Configuration
    pub config: ProxyConfig,

    /// Requests waiting for dispatch
    pub queue: Arc<AdmissionQueue>,

    /// Answers keyed by normalized query
    pub cache: Arc<ResponseCache>,

    /// Upstream gateway used by the dispatch loop
    pub upstream: Arc<dyn ScoreGateway>,

    /// Current dispatch interval
    pub cadence: Arc<Cadence>,

    /// Counters shared by the queue and the dispatch loop
    pub queue_metrics: Arc<QueueMetrics>,

    /// Set while the dispatch loop is running
    pub dispatcher_running: Arc<AtomicBool>,
}

impl AppState {
    /// Create new application state with the HTTP upstream client
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let client = ScoreClient::new(config.upstream.clone())?;
        Ok(Self::with_gateway(config, Arc::new(client)))
    }

    /// Create application state around any gateway implementation
    pub fn with_gateway(config: ProxyConfig, upstream: Arc<dyn ScoreGateway>) -> Self {
        let queue_metrics = Arc::new(QueueMetrics::new());
        let queue = Arc::new(AdmissionQueue::new(
            config.queue.capacity,
            queue_metrics.clone(),
        ));
        let cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let cadence = Arc::new(Cadence::from_config(&config.scheduler));

        Self {
            config,
            queue,
            cache,
            upstream,
            cadence,
            queue_metrics,
            dispatcher_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build the dispatch loop wired to this state
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.queue.clone(),
            self.upstream.clone(),
            self.cache.clone(),
            self.cadence.clone(),
            self.config.scheduler.clone(),
        )
        .with_running_flag(self.dispatcher_running.clone())
    }
}

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Port to listen on
    pub port: u16,

    pub queue: QueueConfig,

    pub scheduler: SchedulerConfig,

    pub cache: CacheConfig,

    pub upstream: UpstreamConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("SCOREGATE_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            queue: QueueConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            cache: CacheConfig::from_env(),
            upstream: UpstreamConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.queue.admission_wait, Duration::from_millis(50));
        assert_eq!(config.queue.request_ttl, Duration::from_secs(10));
        assert_eq!(config.upstream.base_url, "https://score.hsborges.dev");
        assert_eq!(config.upstream.score_path, "/score");
    }

    #[tokio::test]
    async fn test_state_wiring() {
        let mut config = ProxyConfig::default();
        config.queue.capacity = 3;
        let state = AppState::new(config).unwrap();

        assert_eq!(state.queue.capacity(), 3);
        assert!(state.cache.is_empty().await);
        assert_eq!(state.cadence.current(), Duration::from_secs(1));
        assert!(state.upstream.breaker_state().is_some());
        assert!(Arc::ptr_eq(state.queue.metrics(), &state.queue_metrics));

        let dispatcher = state.dispatcher();
        assert!(Arc::ptr_eq(dispatcher.running(), &state.dispatcher_running));
    }
}
