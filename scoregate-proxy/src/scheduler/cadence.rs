//! Two-level dispatch cadence driven by observed upstream latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::info;

use super::config::SchedulerConfig;

/// Delay applied between dispatch cycles.
///
/// A plain step function: a call slower than `base + penalty - margin` moves
/// the next interval to `base + penalty`, any faster call moves it straight
/// back to `base`. Only the latest observation counts, there is no smoothing.
///
/// Publishing the interval to metrics is left to the dispatch loop.
#[derive(Debug)]
pub struct Cadence {
    base_ms: u64,
    /// `base + penalty`, saturated
    penalized_ms: u64,
    /// `base + penalty - margin`, saturated at both ends
    threshold_ms: u64,
    current_ms: AtomicU64,
}

impl Cadence {
    pub fn new(base: Duration, penalty: Duration, margin: Duration) -> Self {
        let base_ms = millis(base);
        let penalized_ms = base_ms.saturating_add(millis(penalty));
        Self {
            base_ms,
            penalized_ms,
            threshold_ms: penalized_ms.saturating_sub(millis(margin)),
            current_ms: AtomicU64::new(base_ms),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.base_interval,
            config.penalty_extra_delay,
            config.penalty_margin,
        )
    }

    /// Interval to sleep before the next cycle
    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms.load(Ordering::Acquire))
    }

    pub fn in_penalty(&self) -> bool {
        self.current_ms.load(Ordering::Acquire) != self.base_ms
    }

    /// Latency above which the next cycle is penalized
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    /// Feed the latency of the call that just finished and return the next interval
    pub fn observe(&self, latency: Duration) -> Duration {
        let observed_ms = millis(latency);
        let target = if observed_ms > self.threshold_ms {
            self.penalized_ms
        } else {
            self.base_ms
        };

        let previous = self.current_ms.swap(target, Ordering::AcqRel);
        if previous != target {
            info!(
                previous_ms = previous,
                next_ms = target,
                observed_ms,
                "Dispatch interval adjusted"
            );
        }

        Duration::from_millis(target)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
