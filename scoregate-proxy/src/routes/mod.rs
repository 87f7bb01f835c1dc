//! HTTP route handlers for the scoregate proxy.
//!
//! This module organizes all route handlers:
//! - `health`: Health check and metrics endpoints
//! - `score`: The queued, cached score endpoint

pub mod health;
pub mod score;

// Re-export handlers for convenience
pub use health::{health, live, metrics, metrics_prometheus, ready};
pub use score::score;
