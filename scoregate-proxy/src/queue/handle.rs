//! One-shot result slot shared between a waiting caller and the dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::upstream::UpstreamError;

/// What the dispatch loop produces for a request
pub type DispatchResult = Result<String, UpstreamError>;

/// Outcome of a bounded wait on a [`ResultHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The upstream answered with a body
    Success(String),
    /// The upstream call failed
    Failure(UpstreamError),
    /// Nothing was resolved within the wait budget
    TimedOut,
}

/// Single-assignment slot for a request's outcome.
///
/// Clones share the same slot. The first call to [`resolve`](Self::resolve) or
/// [`fail`](Self::fail) wins; later attempts are ignored and report `false`.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    slot: Arc<watch::Sender<Option<DispatchResult>>>,
}

impl ResultHandle {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Resolve with a success body. Returns false if already resolved.
    pub fn resolve(&self, body: String) -> bool {
        self.settle(Ok(body))
    }

    /// Resolve with a failure. Returns false if already resolved.
    pub fn fail(&self, error: UpstreamError) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, result: DispatchResult) -> bool {
        self.slot.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Current value without waiting
    pub fn peek(&self) -> Option<DispatchResult> {
        self.slot.borrow().clone()
    }

    /// Wait up to `max_wait` for the outcome.
    ///
    /// Timing out leaves the handle untouched; a late resolution is simply
    /// never observed by this caller.
    pub async fn wait(&self, max_wait: Duration) -> Resolution {
        let mut rx = self.slot.subscribe();
        let settled = match tokio::time::timeout(max_wait, rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => value.clone(),
            // The sender lives in `self`, so the channel cannot close under us
            Ok(Err(_)) | Err(_) => None,
        };

        match settled {
            Some(Ok(body)) => Resolution::Success(body),
            Some(Err(error)) => Resolution::Failure(error),
            None => Resolution::TimedOut,
        }
    }
}

impl Default for ResultHandle {
    fn default() -> Self {
        Self::new()
    }
}
