//! Admission and queuing for score requests.
//!
//! Callers never talk to the upstream directly. Each request is wrapped in a
//! [`ScoreRequest`], admitted into a bounded [`AdmissionQueue`], and the caller
//! then waits on the request's [`ResultHandle`] until the dispatch loop has
//! answered it (or the caller's own budget runs out).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Incoming Requests                     │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ admit(max_wait)
//!                    ┌────────▼────────┐
//!                    │   Semaphore     │ ← Capacity slots
//!                    │  (queue size)   │   (rejects when exhausted)
//!                    └────────┬────────┘
//!                             │
//!                    ┌────────▼────────┐
//!                    │  BinaryHeap     │ ← HIGH > MEDIUM > LOW,
//!                    │                 │   then arrival order
//!                    └────────┬────────┘
//!                             │ take()
//!                    ┌────────▼────────┐
//!                    │ Dispatch loop   │ ← One call in flight
//!                    └─────────────────┘
//! ```
//!
//! Capacity and ordering are deliberately separate: a rejected admission only
//! ever touches the semaphore, never the heap.

mod admission;
mod config;
mod handle;
mod metrics;
mod request;

pub use admission::{AdmissionQueue, GateOutcome, QueueError};
pub use config::QueueConfig;
pub use handle::{DispatchResult, Resolution, ResultHandle};
pub use metrics::{QueueMetrics, QueueSnapshot};
pub use request::{Priority, ScoreRequest};
