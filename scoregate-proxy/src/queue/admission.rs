//! Bounded, priority-ordered admission queue.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, warn};

use super::handle::Resolution;
use super::metrics::QueueMetrics;
use super::request::ScoreRequest;
use crate::metrics as prom;
use crate::upstream::UpstreamError;

/// Error types for queue operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Admission queue is closed")]
    Closed,
}

/// Caller-visible outcome of [`AdmissionQueue::admit_and_await`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The upstream answered
    Success(String),
    /// The upstream call failed
    UpstreamFailure(UpstreamError),
    /// No capacity slot freed up within the admission wait
    RejectedCapacity,
    /// Admitted, but no result arrived within the result wait
    TimedOut,
}

/// Heap entry; the arrival sequence breaks exact ties
struct Pending {
    seq: u64,
    request: ScoreRequest,
}

impl Ord for Pending {
    // BinaryHeap pops the greatest entry, so "dispatched first" must compare greater
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .request
            .dispatch_order(&self.request)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Pending {}

/// Bounded holding area between callers and the dispatch loop.
///
/// Capacity is a counting semaphore whose permits are forgotten on admission
/// and handed back by [`take`](Self::take); the heap itself is unbounded and
/// only ever sees requests that already own a slot.
pub struct AdmissionQueue {
    capacity: usize,
    slots: Semaphore,
    pending: Mutex<BinaryHeap<Pending>>,
    ready: Notify,
    next_seq: AtomicU64,
    closed: AtomicBool,
    metrics: Arc<QueueMetrics>,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, metrics: Arc<QueueMetrics>) -> Self {
        Self {
            capacity,
            slots: Semaphore::new(capacity),
            pending: Mutex::new(BinaryHeap::with_capacity(capacity)),
            ready: Notify::new(),
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics,
        }
    }

    /// Try to admit a request, waiting up to `max_wait` for a free slot.
    ///
    /// Returns `Ok(false)` when no slot freed up in time; the request is then
    /// dropped without ever touching the heap.
    pub async fn admit(&self, request: ScoreRequest, max_wait: Duration) -> Result<bool, QueueError> {
        self.metrics.record_received();

        let permit = match tokio::time::timeout(max_wait, self.slots.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(QueueError::Closed),
            Err(_) => {
                self.metrics.record_rejected();
                debug!(
                    request_id = %request.id(),
                    priority = %request.priority(),
                    capacity = self.capacity,
                    "Admission rejected, queue at capacity"
                );
                return Ok(false);
            }
        };

        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::Acquire) {
                // Dropping the permit gives the slot back
                drop(permit);
                return Err(QueueError::Closed);
            }
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %request.id(),
                priority = %request.priority(),
                seq,
                "Request admitted"
            );
            pending.push(Pending { seq, request });
            // The slot now belongs to the queued entry until `take` releases it
            permit.forget();
        }

        let depth = self.occupancy() as u64;
        self.metrics.record_admitted(depth);
        prom::record_enqueued();
        prom::set_queue_size(depth);
        self.ready.notify_one();

        Ok(true)
    }

    /// Remove the next request, waiting until one is available.
    ///
    /// Highest priority first, then earliest arrival. The request's slot is
    /// released before this returns. Cancelling the returned future never
    /// loses a request.
    pub async fn take(&self) -> ScoreRequest {
        loop {
            let notified = self.ready.notified();

            let next = self.pending.lock().await.pop();
            if let Some(Pending { request, .. }) = next {
                self.slots.add_permits(1);

                let wait = request.age();
                self.metrics.record_dispatched(wait);
                prom::record_queue_wait(wait.as_secs_f64());
                prom::set_queue_size(self.occupancy() as u64);
                return request;
            }

            notified.await;
        }
    }

    /// Admit a request and wait for its outcome.
    ///
    /// `admission_wait` bounds the wait for a capacity slot, `result_wait` the
    /// wait for the dispatch loop's answer once admitted. A result-wait timeout
    /// does not cancel the request; it may still be dispatched later.
    pub async fn admit_and_await(
        &self,
        request: ScoreRequest,
        admission_wait: Duration,
        result_wait: Duration,
    ) -> Result<GateOutcome, QueueError> {
        let handle = request.handle().clone();
        let id = request.id().to_string();

        if !self.admit(request, admission_wait).await? {
            return Ok(GateOutcome::RejectedCapacity);
        }

        let outcome = match handle.wait(result_wait).await {
            Resolution::Success(body) => GateOutcome::Success(body),
            Resolution::Failure(error) => GateOutcome::UpstreamFailure(error),
            Resolution::TimedOut => {
                self.metrics.record_timed_out();
                warn!(
                    request_id = %id,
                    waited_ms = result_wait.as_millis() as u64,
                    "Gave up waiting for upstream result"
                );
                GateOutcome::TimedOut
            }
        };

        Ok(outcome)
    }

    /// Admitted-but-not-yet-taken requests: capacity minus free slots
    pub fn occupancy(&self) -> usize {
        self.capacity.saturating_sub(self.slots.available_permits())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests currently sitting in the heap
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Stop accepting admissions. Queued requests can still be taken.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }
}
