//! In-process fake scoring service shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};

/// What the fake upstream has seen so far
#[derive(Default)]
pub struct Recorder {
    pub hits: AtomicUsize,
    pub client_ids: Mutex<Vec<Option<String>>>,
    pub forwarded: Mutex<Vec<HashMap<String, String>>>,
}

impl Recorder {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_client_id(&self) -> Option<String> {
        self.client_ids.lock().unwrap().last().cloned().flatten()
    }

    pub fn last_headers(&self) -> HashMap<String, String> {
        self.forwarded.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

/// `GET /score?cpf=..`:
/// - `cpf=fail` answers 503 with a noisy body
/// - `cpf=slow` sleeps 500ms before answering
/// - anything else answers 200 with a score wrapped in noise
async fn score(
    State(recorder): State<Arc<Recorder>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    recorder.hits.fetch_add(1, Ordering::SeqCst);
    recorder.client_ids.lock().unwrap().push(
        headers
            .get("client-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    recorder.forwarded.lock().unwrap().push(
        headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect(),
    );

    let cpf = params.get("cpf").cloned().unwrap_or_default();
    match cpf.as_str() {
        "fail" => (
            StatusCode::SERVICE_UNAVAILABLE,
            "error: {\"detail\":\"overloaded\"}".to_string(),
        ),
        "slow" => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            (StatusCode::OK, format!("{{\"cpf\":\"{}\",\"score\":500}}", cpf))
        }
        _ => (
            StatusCode::OK,
            format!("garbage {{\"cpf\":\"{}\",\"score\":742}} trailer", cpf),
        ),
    }
}

/// Start the fake upstream on an ephemeral port
pub async fn spawn_upstream() -> (SocketAddr, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let app = Router::new()
        .route("/score", get(score))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, recorder)
}

/// Serve an axum router on an ephemeral port
pub async fn spawn_router(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
