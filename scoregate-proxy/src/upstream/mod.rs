//! Gateway to the upstream scoring service.
//!
//! The dispatch loop only knows the [`ScoreGateway`] contract: given the
//! caller's query, headers and optional client identity, eventually produce a
//! body or fail. [`ScoreClient`] is the HTTP implementation, wrapped in a
//! timeout and a [`CircuitBreaker`].
//!
//! Non-2xx answers are *not* failures here: the upstream did answer, so the
//! client shapes them into a structured payload and returns `Ok`. Only
//! transport problems (breaker open, timeout, connection errors) come back as
//! [`UpstreamError`].

mod breaker;
mod client;
mod config;
pub mod payload;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use client::ScoreClient;
pub use config::UpstreamConfig;

/// Transport-level failures of an upstream call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The circuit breaker short-circuited the call
    #[error("Circuit breaker is open")]
    BreakerOpen,

    /// The call did not finish within the configured timeout
    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream could not be reached or the response could not be read
    #[error("Failed to reach upstream: {0}")]
    Connection(String),

    /// The dispatch cycle itself failed
    #[error("Dispatch failed: {0}")]
    Internal(String),
}

impl UpstreamError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BreakerOpen => "breaker_open",
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::Internal(_) => "internal",
        }
    }

    /// Payload handed to callers in place of a real answer
    pub fn fallback_body(&self) -> &'static str {
        payload::FALLBACK
    }
}

/// Asynchronous contract the dispatch loop consumes
#[async_trait]
pub trait ScoreGateway: Send + Sync {
    /// Issue one upstream call.
    ///
    /// `client_id` overrides the configured default identity when present.
    async fn call(
        &self,
        query: &HashMap<String, String>,
        headers: &HashMap<String, String>,
        client_id: Option<&str>,
    ) -> Result<String, UpstreamError>;

    /// Breaker state, for gateways that have one
    fn breaker_state(&self) -> Option<BreakerState> {
        None
    }
}
