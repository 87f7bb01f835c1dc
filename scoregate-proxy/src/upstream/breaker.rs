//! Circuit breaker guarding the upstream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,

    /// How long the circuit stays open before a probe is allowed
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Circuit {
    Closed { failures: u32 },
    Open { until: Instant },
    /// One probe is allowed through; `probing` is set while it is in flight
    HalfOpen { probing: bool },
}

/// Consecutive-failure circuit breaker.
///
/// Closed → Open after `failure_threshold` failures in a row. While open,
/// [`try_acquire`](Self::try_acquire) refuses immediately. Once
/// `open_duration` has passed a single probe goes through; its success closes
/// the circuit, its failure opens it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    circuit: Mutex<Circuit>,
    rejected: AtomicU64,
    opens: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            circuit: Mutex::new(Circuit::Closed { failures: 0 }),
            rejected: AtomicU64::new(0),
            opens: AtomicU64::new(0),
        }
    }

    fn circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask permission for one call
    pub fn try_acquire(&self) -> bool {
        let mut circuit = self.circuit();
        match *circuit {
            Circuit::Closed { .. } => true,
            Circuit::Open { until } if Instant::now() >= until => {
                info!("Circuit breaker half-open, probing upstream");
                *circuit = Circuit::HalfOpen { probing: true };
                true
            }
            Circuit::HalfOpen { probing: false } => {
                *circuit = Circuit::HalfOpen { probing: true };
                true
            }
            Circuit::Open { .. } | Circuit::HalfOpen { probing: true } => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Record a call that reached the upstream
    pub fn record_success(&self) {
        let mut circuit = self.circuit();
        if matches!(*circuit, Circuit::HalfOpen { .. }) {
            info!("Circuit breaker closed, upstream recovered");
        }
        *circuit = Circuit::Closed { failures: 0 };
    }

    /// Record a transport failure
    pub fn record_failure(&self) {
        let mut circuit = self.circuit();
        let next = match *circuit {
            Circuit::Closed { failures } if failures + 1 < self.config.failure_threshold => {
                Circuit::Closed {
                    failures: failures + 1,
                }
            }
            Circuit::Open { until } => Circuit::Open { until },
            Circuit::Closed { .. } | Circuit::HalfOpen { .. } => {
                self.opens.fetch_add(1, Ordering::Relaxed);
                warn!(
                    open_for_secs = self.config.open_duration.as_secs(),
                    "Circuit breaker opened"
                );
                Circuit::Open {
                    until: Instant::now() + self.config.open_duration,
                }
            }
        };
        *circuit = next;
    }

    pub fn state(&self) -> BreakerState {
        match *self.circuit() {
            Circuit::Closed { .. } => BreakerState::Closed,
            Circuit::Open { .. } => BreakerState::Open,
            Circuit::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Calls refused while open
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Times the circuit has opened
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }
}
