//! HTTP client for the upstream scoring service.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use super::breaker::{BreakerState, CircuitBreaker};
use super::config::UpstreamConfig;
use super::payload;
use super::{ScoreGateway, UpstreamError};
use crate::metrics as prom;

/// Caller headers that must not be replayed upstream
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
    "accept-encoding",
];

/// Upstream scoring client
pub struct ScoreClient {
    /// HTTP client
    client: Client,
    config: UpstreamConfig,
    breaker: CircuitBreaker,
}

impl ScoreClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        debug!(url = %config.base_url, "Creating upstream client");

        let client = Client::builder().gzip(true).build()?;
        let breaker = CircuitBreaker::new(config.breaker.clone());

        Ok(Self {
            client,
            config,
            breaker,
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Full URL of the score endpoint
    pub fn score_url(&self) -> String {
        format!("{}{}", self.config.base_url, self.config.score_path)
    }

    /// The caller's identity if present, otherwise the configured default
    pub fn effective_client_id<'a>(&'a self, client_id: Option<&'a str>) -> Option<&'a str> {
        client_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(self.config.client_id.as_deref())
    }

    fn outbound_headers(
        &self,
        headers: &HashMap<String, String>,
        client_id: Option<&str>,
    ) -> HeaderMap {
        let mut outbound = HeaderMap::new();

        for (name, value) in headers {
            if SKIPPED_HEADERS.iter().any(|skip| name.eq_ignore_ascii_case(skip)) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    outbound.insert(name, value);
                }
                _ => debug!(header = %name, "Skipping header that cannot be forwarded"),
            }
        }

        outbound.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(id) = self.effective_client_id(client_id) {
            match HeaderValue::from_str(id) {
                Ok(value) => {
                    outbound.insert(HeaderName::from_static("client-id"), value);
                }
                Err(_) => warn!("Client id is not a valid header value, sending without it"),
            }
        }

        outbound
    }

    #[instrument(skip(self, query, headers))]
    async fn fetch(
        &self,
        query: &HashMap<String, String>,
        headers: &HashMap<String, String>,
        client_id: Option<&str>,
    ) -> Result<String, reqwest::Error> {
        let url = self.score_url();
        debug!(url = %url, params = query.len(), "Calling upstream");

        let response = self
            .client
            .get(&url)
            .query(query)
            .headers(self.outbound_headers(headers, client_id))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: Bytes = response.bytes().await?;
            return Ok(payload::annotate_score(&String::from_utf8_lossy(&body)));
        }

        let body = response.bytes().await.unwrap_or_default();
        warn!(status = %status, "Upstream answered with an error status");
        Ok(payload::upstream_error(
            status.as_u16(),
            &String::from_utf8_lossy(&body),
        ))
    }
}

#[async_trait]
impl ScoreGateway for ScoreClient {
    async fn call(
        &self,
        query: &HashMap<String, String>,
        headers: &HashMap<String, String>,
        client_id: Option<&str>,
    ) -> Result<String, UpstreamError> {
        if !self.breaker.try_acquire() {
            debug!("Circuit breaker open, skipping upstream call");
            return Err(UpstreamError::BreakerOpen);
        }

        let result = match tokio::time::timeout(
            self.config.timeout,
            self.fetch(query, headers, client_id),
        )
        .await
        {
            Ok(Ok(body)) => {
                self.breaker.record_success();
                Ok(body)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure();
                Err(UpstreamError::Connection(e.to_string()))
            }
            Err(_) => {
                self.breaker.record_failure();
                Err(UpstreamError::Timeout(self.config.timeout))
            }
        };

        prom::set_breaker_state(self.breaker.state());
        result
    }

    fn breaker_state(&self) -> Option<BreakerState> {
        Some(self.breaker.state())
    }
}
