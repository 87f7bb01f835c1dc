//! Configuration for the upstream client.

use std::time::Duration;

use super::breaker::BreakerConfig;

/// Configuration for the upstream scoring service
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the scoring service
    pub base_url: String,

    /// Path of the score endpoint, appended to `base_url`
    pub score_path: String,

    /// Client identity used when the caller does not supply one
    pub client_id: Option<String>,

    /// Upper bound for a whole upstream call
    pub timeout: Duration,

    /// Circuit breaker tuning
    pub breaker: BreakerConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://score.hsborges.dev".to_string(),
            score_path: "/score".to_string(),
            client_id: None,
            timeout: Duration::from_secs(5),
            breaker: BreakerConfig::default(),
        }
    }
}

impl UpstreamConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCOREGATE_UPSTREAM_URL") {
            config.base_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = std::env::var("SCOREGATE_SCORE_PATH") {
            config.score_path = val;
        }

        config.client_id = std::env::var("SCOREGATE_CLIENT_ID")
            .or_else(|_| std::env::var("CLIENT_ID"))
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        if let Ok(val) = std::env::var("SCOREGATE_UPSTREAM_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                config.timeout = Duration::from_millis(n);
            }
        }

        if let Ok(val) = std::env::var("SCOREGATE_BREAKER_FAILURE_THRESHOLD") {
            if let Ok(n) = val.parse() {
                config.breaker.failure_threshold = n;
            }
        }

        if let Ok(val) = std::env::var("SCOREGATE_BREAKER_OPEN_SECS") {
            if let Ok(n) = val.parse() {
                config.breaker.open_duration = Duration::from_secs(n);
            }
        }

        config
    }

    /// True when a default client identity is configured
    pub fn has_default_client_id(&self) -> bool {
        self.client_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UpstreamConfig::default();
        assert_eq!(config.base_url, "https://score.hsborges.dev");
        assert_eq!(config.score_path, "/score");
        assert!(!config.has_default_client_id());
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
