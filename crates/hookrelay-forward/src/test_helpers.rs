//! Shared test helpers: a local HTTP target that records what it receives.

use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use tokio::sync::mpsc;

/// One request as seen by the target.
#[derive(Debug)]
pub struct Captured {
    pub method: String,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A running target server.
pub struct Target {
    /// Base URL, e.g. `http://127.0.0.1:PORT`.
    pub url: String,
    pub requests: mpsc::UnboundedReceiver<Captured>,
}

impl Target {
    /// Next captured request, failing the test after five seconds.
    pub async fn next(&mut self) -> Captured {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

#[derive(Clone)]
struct TargetState {
    tx: mpsc::UnboundedSender<Captured>,
    status: StatusCode,
}

async fn capture(
    State(state): State<TargetState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let _ = state.tx.send(Captured {
        method: method.to_string(),
        uri: uri.to_string(),
        headers,
        body: body.to_vec(),
    });
    (state.status, format!("target says {}", state.status.as_u16()))
}

/// Start a target answering every request with `status`.
pub async fn spawn_target(status: u16) -> Target {
    let (tx, requests) = mpsc::unbounded_channel();
    let state = TargetState {
        tx,
        status: StatusCode::from_u16(status).unwrap(),
    };
    let router = Router::new().fallback(capture).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Target {
        url: format!("http://{addr}"),
        requests,
    }
}
