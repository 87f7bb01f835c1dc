//! Error types for the scoregate proxy.

use std::time::Duration;

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::queue::QueueError;
use crate::upstream::UpstreamError;

/// Proxy error types
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Request parsing error
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No queue slot freed up within the admission wait
    #[error("Queue is full, try again later")]
    QueueFull,

    /// Admitted, but no answer arrived in time
    #[error("Timed out after {0:?} waiting for the upstream answer")]
    Timeout(Duration),

    /// The upstream call failed
    #[error("Upstream unavailable: {0}")]
    Upstream(UpstreamError),

    /// The proxy is shutting down
    #[error("Service unavailable: {0}")]
    Unavailable(#[from] QueueError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<QueryRejection> for ProxyError {
    fn from(rejection: QueryRejection) -> Self {
        ProxyError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = format!("{:?}", self);
        let error_type = error_type
            .split(|c: char| c == '(' || c == ' ')
            .next()
            .unwrap_or("Unknown")
            .to_string();

        let mut body = json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
            }
        });

        if let ProxyError::Upstream(err) = &self {
            let fallback = serde_json::from_str::<serde_json::Value>(err.fallback_body())
                .unwrap_or_else(|_| json!(err.fallback_body()));
            body["fallback"] = fallback;
        }

        (status, Json(body)).into_response()
    }
}
