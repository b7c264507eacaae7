use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EngineCore, EngineState};
use crate::error::{EngineError, ErrorCode};
use crate::stats::StatsSnapshot;
use crate::telemetry::TelemetrySnapshot;

use super::sse;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct DebugHttpState {
    pub engine: &'static EngineCore,
    token: Arc<String>,
}

impl DebugHttpState {
    pub fn new(engine: &'static EngineCore, token: String) -> Self {
        Self {
            engine,
            token: Arc::new(token),
        }
    }

    fn authorize(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<(), HttpServerError> {
        let provided = extract_token(headers, query_token);
        match provided {
            Some(value) if value == *self.token => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }
}

/// Query payload for extracting token from URL.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
    BadRequest(String),
    ServiceUnavailable(&'static str),
}

impl From<EngineError> for HttpServerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotRunning => Self::ServiceUnavailable("engine not running"),
            other => Self::BadRequest(format!("{} (code {})", other.message(), other.code())),
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token".into()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.into()),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine_state: EngineState,
    pub active_streams: usize,
}

/// Stats endpoint response payload.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub counters: StatsSnapshot,
    pub telemetry: TelemetrySnapshot,
}

/// Counter increment request.
#[derive(Debug, Deserialize)]
pub struct CounterRequest {
    pub name: String,
    #[serde(default = "default_count")]
    pub count: u64,
}

fn default_count() -> u64 {
    1
}

/// Build the Axum router with all handlers.
pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/events", get(events))
        .route("/counters", post(record_counter))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding debug HTTP listener")?;
    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .context("serving debug HTTP router")?;
    Ok(())
}

pub async fn health(State(state): State<DebugHttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine_state: state.engine.state(),
        active_streams: state.engine.active_streams(),
    })
}

pub async fn stats(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;

    Ok(Json(StatsResponse {
        counters: state.engine.stats_snapshot(),
        telemetry: state.engine.telemetry_snapshot(),
    }))
}

pub async fn events(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<sse::EngineEventStream, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(sse::engine_events(state.engine))
}

pub async fn record_counter(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    Json(request): Json<CounterRequest>,
) -> Result<StatusCode, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    state.engine.record_counter(&request.name, request.count)?;
    Ok(StatusCode::NO_CONTENT)
}

fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    static X_DEBUG_TOKEN: HeaderName = HeaderName::from_static("x-debug-token");

    headers
        .get(&X_DEBUG_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer ").map(|v| v.to_string()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, LogLevel};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use futures::StreamExt;
    use once_cell::sync::Lazy;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    static TEST_ENGINE: Lazy<EngineCore> = Lazy::new(|| {
        let engine = EngineCore::new();
        engine
            .run(Configuration::text("{}"), LogLevel::Off, None)
            .expect("engine run");
        engine
    });
    const TOKEN: &str = "smoke-token";

    fn make_router() -> Router {
        let state = DebugHttpState::new(&TEST_ENGINE, TOKEN.to_string());
        build_router(state)
    }

    async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
        (status, json)
    }

    fn get_request(uri: impl AsRef<str>) -> Request<Body> {
        Request::builder()
            .uri(uri.as_ref())
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn health_is_open() {
        let (status, json) =
            response_json(make_router().oneshot(get_request("/health")).await.expect("health call"))
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["engine_state"], "running");
    }

    #[tokio::test]
    async fn stats_requires_token() {
        let (status, json) =
            response_json(make_router().oneshot(get_request("/stats")).await.expect("stats call"))
                .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "missing or invalid token");
    }

    #[tokio::test]
    async fn stats_accepts_bearer_token() {
        TEST_ENGINE.record_counter("http.stats", 2).unwrap();
        let request = Request::builder()
            .uri("/stats")
            .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .expect("stats request");

        let (status, json) =
            response_json(make_router().oneshot(request).await.expect("stats call")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["counters"]["counters"]["http.stats"].as_u64().unwrap() >= 2);
        assert!(json["telemetry"]["recent"].is_array());
    }

    #[tokio::test]
    async fn counters_endpoint_records_and_validates() {
        let request = |body: &str| {
            Request::builder()
                .method("POST")
                .uri(format!("/counters?token={TOKEN}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("counter request")
        };

        let ok = make_router()
            .oneshot(request(r#"{"name": "http.posted", "count": 3}"#))
            .await
            .expect("counter call");
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);
        assert!(TEST_ENGINE.stats_snapshot().get("http.posted").unwrap() >= 3);

        let (status, json) = response_json(
            make_router()
                .oneshot(request(r#"{"name": "bad name"}"#))
                .await
                .expect("counter call"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("1010"));
    }

    #[tokio::test]
    async fn events_stream_emits_engine_events() {
        let response = make_router()
            .oneshot(get_request(format!("/events?token={TOKEN}")))
            .await
            .expect("events call");
        assert_eq!(response.status(), StatusCode::OK);

        TEST_ENGINE.flush_stats().unwrap();

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("event within timeout")
            .expect("stream open")
            .expect("chunk bytes");
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.starts_with("event:"), "unexpected frame: {text}");
    }
}
