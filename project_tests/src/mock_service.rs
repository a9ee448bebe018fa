//! In-process stand-in for the device management service.
//!
//! Every request is recorded. Responses are fixed per route, except
//! notification pulls, which replay a queue and answer 204 once it is empty.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Device id whose requests the mock rejects with 503.
pub const UNAVAILABLE_DEVICE: &str = "offline";

/// One request as the mock received it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// HTTP verb.
    pub method: String,
    /// Path and query, e.g. `/v3/devices?limit=1000`.
    pub target: String,
    /// `Authorization` header, if any.
    pub authorization: Option<String>,
    /// JSON body, if it parsed.
    pub body: Option<Value>,
}

/// Shared state of a running mock.
#[derive(Default)]
pub struct MockState {
    /// Every request, in arrival order.
    pub calls: Mutex<Vec<RecordedCall>>,
    /// Scripted `(status, body)` answers for notification pulls.
    pub pulls: Mutex<VecDeque<(u16, String)>>,
}

impl MockState {
    /// Snapshot of recorded calls.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls as `"<METHOD> <target>"`.
    pub fn targets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| format!("{} {}", c.method, c.target))
            .collect()
    }

    /// Appends one scripted pull answer.
    pub fn queue_pull(&self, status: u16, body: Value) {
        self.pulls.lock().unwrap().push_back((status, body.to_string()));
    }

    /// `async-id` values of every device request received, in order.
    pub fn async_ids(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| c.method == "POST" && c.target.starts_with("/v2/device-requests/"))
            .filter_map(|c| c.target.split("async-id=").nth(1).map(str::to_string))
            .collect()
    }
}

/// Starts the mock and returns its base URL (with trailing slash) and state.
pub async fn start() -> (String, Arc<MockState>) {
    let state = Arc::new(MockState::default());
    let app = Router::new().fallback(handle).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/", addr), state)
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    state.calls.lock().unwrap().push(RecordedCall {
        method: method.to_string(),
        target: target.clone(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).ok(),
    });

    let path = uri.path();
    match (method.as_str(), path) {
        ("GET", "/v3/devices") => {
            let page = if target.contains("after=dev2") {
                json!({
                    "data": [{ "id": "dev3", "name": null, "state": "registered" }],
                    "has_more": false
                })
            } else {
                json!({
                    "data": [
                        { "id": "dev1", "name": "thermo", "state": "registered" },
                        { "id": "dev2", "name": "spare", "state": "deregistered" }
                    ],
                    "has_more": true
                })
            };
            (StatusCode::OK, page.to_string())
        }
        ("GET", p) if p.starts_with("/v2/endpoints/") => {
            let resources = json!([
                { "uri": "/3303/0/5700", "rt": "temperature", "obs": true },
                { "uri": "/1/0/1", "obs": false }
            ]);
            (StatusCode::OK, resources.to_string())
        }
        ("POST", p) if p.starts_with("/v2/device-requests/") => {
            if p.ends_with(UNAVAILABLE_DEVICE) {
                (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_FULL".to_string())
            } else {
                (StatusCode::ACCEPTED, String::new())
            }
        }
        ("GET", "/v2/notification/pull") => match state.pulls.lock().unwrap().pop_front() {
            Some((status, body)) => (StatusCode::from_u16(status).unwrap(), body),
            None => (StatusCode::NO_CONTENT, String::new()),
        },
        ("PUT", _) | ("DELETE", _) => (StatusCode::NO_CONTENT, String::new()),
        _ => (StatusCode::NOT_FOUND, String::new()),
    }
}
