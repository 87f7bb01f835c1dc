//! Configuration for the dispatch loop.

use std::time::Duration;

/// Configuration for the dispatch loop and its cadence
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between dispatches while the upstream is healthy
    pub base_interval: Duration,

    /// Extra delay added while the upstream is slow
    pub penalty_extra_delay: Duration,

    /// Slack subtracted from `base + penalty` before a call counts as slow
    pub penalty_margin: Duration,

    /// Delay before the first dispatch, letting collaborators finish starting
    pub warmup: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1000), // 1 req/s
            penalty_extra_delay: Duration::from_millis(2000),
            penalty_margin: Duration::from_millis(50),
            warmup: Duration::from_millis(200),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCOREGATE_SCHEDULER_BASE_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                config.base_interval = Duration::from_millis(n);
            }
        }

        if let Ok(val) = std::env::var("SCOREGATE_PENALTY_EXTRA_DELAY_MS") {
            if let Ok(n) = val.parse() {
                config.penalty_extra_delay = Duration::from_millis(n);
            }
        }

        config
    }

    /// Interval used while in the penalty regime
    pub fn penalty_interval(&self) -> Duration {
        self.base_interval.saturating_add(self.penalty_extra_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.base_interval, Duration::from_secs(1));
        assert_eq!(config.penalty_interval(), Duration::from_secs(3));
        assert_eq!(config.penalty_margin, Duration::from_millis(50));
        assert_eq!(config.warmup, Duration::from_millis(200));
    }

    #[test]
    fn test_penalty_interval_saturates() {
        let config = SchedulerConfig {
            penalty_extra_delay: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(config.penalty_interval(), Duration::MAX);
    }
}
