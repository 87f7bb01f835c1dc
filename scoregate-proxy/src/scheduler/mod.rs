//! Rate-limited dispatch of queued score requests.
//!
//! A single [`Dispatcher`] task drains the admission queue one request at a
//! time. After each upstream call it sleeps for the interval chosen by the
//! [`Cadence`], which switches between a base interval and a penalty
//! interval depending on how long the last call took.
//!
//! ```text
//!   take() ──► expired? ──yes──► drop (counted) ─────────────┐
//!                 │no                                        │
//!                 ▼                                          │
//!           gateway.call() ──► cache + resolve handle        │
//!                 │                                          │
//!                 ▼                                          ▼
//!        cadence.observe(latency) ───────────────► sleep(cadence.current())
//! ```
//!
//! Exactly one call is in flight at any time; that single-flight pacing is
//! what keeps the upstream within its rate limit.

mod cadence;
mod config;
mod dispatcher;

pub use cadence::Cadence;
pub use config::SchedulerConfig;
pub use dispatcher::{CycleOutcome, Dispatcher};
