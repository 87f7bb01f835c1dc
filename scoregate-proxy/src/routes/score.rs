//! Inbound score endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, info};

use crate::cache::cache_key;
use crate::error::ProxyError;
use crate::metrics as prom;
use crate::queue::{GateOutcome, Priority, ScoreRequest};
use crate::state::AppState;

/// Header carrying the caller's identity
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Query parameter carrying the caller's identity when the header is absent
pub const CLIENT_ID_PARAM: &str = "clientId";

pub const PRIORITY_HEADER: &str = "x-priority";

/// Scoring endpoint
///
/// GET /proxy/score
///
/// Serves from the cache when possible, otherwise queues the request and
/// waits for the dispatch loop to answer it.
///
/// The identity override is the `x-client-id` header when it is non-blank.
/// A missing or blank header falls through to the `clientId` query parameter.
pub async fn score(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let Query(params) = query?;
    let client_id = override_client_id(&headers, &params);
    if client_id.is_none() && !state.config.upstream.has_default_client_id() {
        return Err(ProxyError::InvalidRequest(format!(
            "missing client id: send the {} header or the {} query parameter, \
             or configure SCOREGATE_CLIENT_ID",
            CLIENT_ID_HEADER, CLIENT_ID_PARAM
        )));
    }

    let key = cache_key(&params);
    if let Some(body) = state.cache.get(&key).await {
        return Ok(json_body(body));
    }

    let priority = priority_from_headers(&headers);
    let ttl = state.config.queue.request_ttl;
    let mut request = ScoreRequest::new(
        state.config.upstream.score_path.clone(),
        params,
        header_map(&headers),
    )
    .with_priority(priority)
    .with_ttl(ttl);
    if let Some(id) = client_id {
        request = request.with_client_id(id);
    }

    let request_id = request.id().to_string();
    debug!(request_id = %request_id, priority = %priority, key = %key, "Queuing score request");

    let outcome = state
        .queue
        .admit_and_await(request, state.config.queue.admission_wait, ttl)
        .await?;

    match outcome {
        GateOutcome::Success(body) => Ok(json_body(body)),
        GateOutcome::RejectedCapacity => {
            prom::record_drop("full");
            info!(request_id = %request_id, priority = %priority, "Queue full, request dropped");
            Err(ProxyError::QueueFull)
        }
        GateOutcome::TimedOut => {
            prom::record_drop("timeout");
            Err(ProxyError::Timeout(ttl))
        }
        GateOutcome::UpstreamFailure(err) => Err(ProxyError::Upstream(err)),
    }
}

fn json_body(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Identity override: non-blank header first, then the query parameter
fn override_client_id(headers: &HeaderMap, params: &HashMap<String, String>) -> Option<String> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            params
                .get(CLIENT_ID_PARAM)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}

fn priority_from_headers(headers: &HeaderMap) -> Priority {
    headers
        .get(PRIORITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(Priority::from_label)
        .unwrap_or_default()
}

/// Caller headers with lower-cased names; non-UTF-8 values are skipped
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_header_identity_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("  acme "));
        let id = override_client_id(&headers, &params(&[("clientId", "other")]));
        assert_eq!(id.as_deref(), Some("acme"));
    }

    #[test]
    fn test_blank_header_falls_back_to_param() {
        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, HeaderValue::from_static("   "));
        let id = override_client_id(&headers, &params(&[("clientId", " q-client ")]));
        assert_eq!(id.as_deref(), Some("q-client"));
    }

    #[test]
    fn test_no_identity() {
        assert_eq!(override_client_id(&HeaderMap::new(), &params(&[])), None);
        assert_eq!(
            override_client_id(&HeaderMap::new(), &params(&[("clientId", "")])),
            None
        );
    }

    #[test]
    fn test_priority_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(priority_from_headers(&headers), Priority::Medium);

        headers.insert(PRIORITY_HEADER, HeaderValue::from_static("high"));
        assert_eq!(priority_from_headers(&headers), Priority::High);

        headers.insert(PRIORITY_HEADER, HeaderValue::from_static("urgent"));
        assert_eq!(priority_from_headers(&headers), Priority::Medium);
    }

    #[test]
    fn test_header_map_lowercases() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Trace", HeaderValue::from_static("abc"));
        let map = header_map(&headers);
        assert_eq!(map.get("x-trace").map(String::as_str), Some("abc"));
    }
}
