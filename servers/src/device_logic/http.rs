//! # HTTP Boundary
//!
//! - `POST|PUT /callback`: webhook target for notification batches (push mode
//!   only). Always answers 204 so the service never disables the webhook.
//! - `PUT|POST /devices/{device_id}/{obj}/{inst}/{res}`: write or execute a
//!   resource. The request is dispatched in the background; the handler
//!   answers 204 right away, or 400 when the decoded device id is not a single
//!   path segment.
//! - `GET /values`, `GET /devices`, `GET /reset-values`: stored data as
//!   `{"results": [...]}`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use lib_common::connections::{DbError, PgEventSink};
use lib_common::devices::{
    is_valid_device_id, NotificationResponse, NotificationRouter, RequestDispatcher, RequestMethod, TransportMode,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<NotificationRouter>,
    pub dispatcher: Arc<RequestDispatcher>,
    pub records: Arc<PgEventSink>,
}

/// Errors of the read endpoints.
#[derive(Debug)]
pub enum AppError {
    Database(DbError),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        AppError::Database(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Database(e) => {
                log::error!("Database error: {}", e);
                let error_type = match e {
                    DbError::Connection(_) => "ConfigurationError",
                    DbError::Pool(_) => "DatabasePoolError",
                    DbError::Query(_) => "DatabaseExecutionError",
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error_type": error_type,
                        "detail": e.to_string()
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Request body of the write and execute endpoints.
#[derive(Debug, Default, Deserialize)]
struct ResourcePayload {
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

impl ResourcePayload {
    /// Lenient parse: a missing or malformed body means "no payload".
    fn from_body(body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::default();
        }
        serde_json::from_slice(body).unwrap_or_default()
    }

    fn as_text(&self) -> Option<String> {
        match &self.payload {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Builds the router. `/callback` is only mounted in push mode.
pub fn build_router(state: AppState, mode: TransportMode) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/values", get(values_handler))
        .route("/devices", get(devices_handler))
        .route("/reset-values", get(reset_values_handler))
        .route(
            "/devices/{device_id}/{obj}/{inst}/{res}",
            post(execute_handler).put(write_handler),
        );

    if mode == TransportMode::Push {
        app = app.route("/callback", post(callback_handler).put(callback_handler));
    }

    app.layer(cors).with_state(state)
}

async fn callback_handler(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<NotificationResponse>(&body) {
        Ok(batch) => {
            let events = state.router.route(Some(&batch));
            log::debug!("Callback delivered {} event(s)", events.len());
        }
        Err(e) => log::warn!("Ignoring malformed callback body: {}", e),
    }
    StatusCode::NO_CONTENT
}

async fn write_handler(
    State(state): State<AppState>,
    Path((device_id, obj, inst, res)): Path<(String, String, String, String)>,
    body: Bytes,
) -> StatusCode {
    spawn_request(state, device_id, format!("/{}/{}/{}", obj, inst, res), &body, RequestMethod::Write)
}

async fn execute_handler(
    State(state): State<AppState>,
    Path((device_id, obj, inst, res)): Path<(String, String, String, String)>,
    body: Bytes,
) -> StatusCode {
    spawn_request(state, device_id, format!("/{}/{}/{}", obj, inst, res), &body, RequestMethod::Execute)
}

fn spawn_request(state: AppState, device_id: String, path: String, body: &[u8], method: RequestMethod) -> StatusCode {
    if !is_valid_device_id(&device_id) {
        log::warn!("{} rejected: invalid device id {:?}", method.as_verb(), device_id);
        return StatusCode::BAD_REQUEST;
    }
    let payload = ResourcePayload::from_body(body).as_text();
    log::info!(
        "{} /devices/{}{} - {}",
        method.as_verb(),
        device_id,
        path,
        payload.as_deref().unwrap_or("")
    );

    tokio::spawn(async move {
        // Failures are logged by the dispatcher.
        let _ = state
            .dispatcher
            .dispatch(&device_id, &path, payload.as_deref(), method)
            .await;
    });
    StatusCode::NO_CONTENT
}

async fn values_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let results = state.records.latest_values().await?;
    Ok(Json(json!({ "results": results })))
}

async fn devices_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let results = state.records.registered_devices().await?;
    Ok(Json(json!({ "results": results })))
}

async fn reset_values_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.records.truncate_values().await?;
    Ok(Json(json!({ "results": [] })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lib_common::devices::{
        CorrelationEntry, CorrelationStore, DeviceError, DeviceRequestBody, DeviceRequests, NotificationEvent,
    };
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingRequests {
        bodies: Mutex<Vec<(String, DeviceRequestBody)>>,
    }

    #[async_trait]
    impl DeviceRequests for RecordingRequests {
        async fn submit_request(
            &self,
            device_id: &str,
            _correlation_id: &str,
            body: &DeviceRequestBody,
        ) -> Result<(), DeviceError> {
            self.bodies.lock().unwrap().push((device_id.to_string(), body.clone()));
            Ok(())
        }
    }

    struct Harness {
        base: String,
        store: Arc<CorrelationStore>,
        requests: Arc<RecordingRequests>,
        events: mpsc::UnboundedReceiver<NotificationEvent>,
    }

    async fn serve(mode: TransportMode) -> Harness {
        let store = Arc::new(CorrelationStore::new());
        let requests = Arc::new(RecordingRequests::default());
        let (tx, events) = mpsc::unbounded_channel();
        let state = AppState {
            router: Arc::new(NotificationRouter::new(store.clone(), tx)),
            dispatcher: Arc::new(RequestDispatcher::new(requests.clone(), store.clone())),
            // Never connected: the pool opens connections lazily.
            records: Arc::new(PgEventSink::connect("postgres://user@127.0.0.1:1/devices", true, false).unwrap()),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state, mode)).await.unwrap();
        });

        Harness {
            base: format!("http://{}", addr),
            store,
            requests,
            events,
        }
    }

    #[tokio::test]
    async fn test_callback_routes_batch_and_answers_no_content() {
        let mut h = serve(TransportMode::Push).await;
        h.store.insert(CorrelationEntry {
            correlation_id: "abc".to_string(),
            device_id: "dev1".to_string(),
            path: "/3303/0/5700".to_string(),
        });

        let body = json!({
            "notifications": [{ "ep": "dev2", "path": "/3304/0/5700", "payload": "NDI=" }],
            "async-responses": [{ "id": "abc", "status": 200, "payload": "MjEuNQ==" }]
        });
        let resp = reqwest::Client::new()
            .put(format!("{}/callback", h.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);

        let first = h.events.recv().await.unwrap();
        let second = h.events.recv().await.unwrap();
        assert_eq!((first.device_id.as_str(), first.payload), ("dev2", 42.0));
        assert_eq!((second.device_id.as_str(), second.payload), ("dev1", 21.5));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_callback_still_answers_no_content() {
        let h = serve(TransportMode::Push).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/callback", h.base))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);
    }

    #[tokio::test]
    async fn test_callback_not_mounted_in_pull_mode() {
        let h = serve(TransportMode::Pull).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/callback", h.base))
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_write_and_execute_dispatch_in_background() {
        let h = serve(TransportMode::Push).await;
        let client = reqwest::Client::new();

        let resp = client
            .put(format!("{}/devices/dev1/3311/0/5850", h.base))
            .json(&json!({ "payload": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);

        let resp = client
            .post(format!("{}/devices/dev1/3311/0/5823", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);

        let mut waited = 0;
        while h.requests.bodies.lock().unwrap().len() < 2 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += 1;
        }

        let mut bodies = h.requests.bodies.lock().unwrap().clone();
        bodies.sort_by(|a, b| a.1.method.cmp(&b.1.method));
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].1.method, "POST");
        assert_eq!(bodies[0].1.uri, "/3311/0/5823");
        assert_eq!(bodies[0].1.payload_b64, None);
        assert_eq!(bodies[1].1.method, "PUT");
        assert_eq!(bodies[1].1.uri, "/3311/0/5850");
        assert_eq!(bodies[1].1.payload_b64.as_deref(), Some("MQ=="));
        assert_eq!(h.store.len(), 2);
    }

    #[tokio::test]
    async fn test_encoded_slash_in_device_id_is_rejected() {
        let h = serve(TransportMode::Push).await;
        let resp = reqwest::Client::new()
            .put(format!("{}/devices/..%2F..%2Fv3%2Fapi-keys/3311/0/5850", h.base))
            .json(&json!({ "payload": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.requests.bodies.lock().unwrap().is_empty());
        assert!(h.store.is_empty());
    }

    #[test]
    fn test_payload_text_forms() {
        assert_eq!(ResourcePayload::from_body(br#"{"payload":"on"}"#).as_text().as_deref(), Some("on"));
        assert_eq!(ResourcePayload::from_body(br#"{"payload":2.5}"#).as_text().as_deref(), Some("2.5"));
        assert_eq!(ResourcePayload::from_body(b"").as_text(), None);
        assert_eq!(ResourcePayload::from_body(b"garbage").as_text(), None);
    }
}
