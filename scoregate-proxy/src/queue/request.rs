//! Queued score requests and their priority classes.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use super::handle::ResultHandle;

/// Priority class of a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Parse a priority label such as the `x-priority` header.
    ///
    /// Matching is case-insensitive; anything unrecognized is `Medium`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Self::High,
            "LOW" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Dispatch rank, lower ranks leave the queue first
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One caller's pending upstream call.
///
/// Built once by the inbound route and never mutated afterwards; the queue
/// takes ownership on admission and the dispatch loop consumes it exactly once.
/// The caller keeps a clone of [`ScoreRequest::handle`] to wait for the answer.
#[derive(Debug)]
pub struct ScoreRequest {
    id: String,
    path: String,
    query_params: HashMap<String, String>,
    headers: HashMap<String, String>,
    client_id: Option<String>,
    priority: Priority,
    enqueued_at: Instant,
    expires_at: Option<Instant>,
    handle: ResultHandle,
}

impl ScoreRequest {
    /// Create a new request with `Medium` priority and no deadline
    pub fn new(
        path: impl Into<String>,
        query_params: HashMap<String, String>,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            query_params,
            headers,
            client_id: None,
            priority: Priority::default(),
            enqueued_at: Instant::now(),
            expires_at: None,
            handle: ResultHandle::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the client identity that overrides the configured default.
    /// Blank values are ignored.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let trimmed = client_id.trim();
        self.client_id = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Expire the request `ttl` after its creation
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.enqueued_at + ttl);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.expires_at = Some(deadline);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn handle(&self) -> &ResultHandle {
        &self.handle
    }

    /// True once the deadline, if any, has been reached
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Time spent since the request was created
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Dispatch order between two requests: `Less` means `self` goes first.
    ///
    /// Higher priority wins, then the earlier creation time. Exact ties are
    /// left to the queue, which breaks them by arrival.
    pub fn dispatch_order(&self, other: &Self) -> Ordering {
        self.priority
            .rank()
            .cmp(&other.priority.rank())
            .then_with(|| self.enqueued_at.cmp(&other.enqueued_at))
    }
}
