// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Stream endpoint: validate the request, pick the mode, hand off to the
//   injected UpstreamClient, return its streaming response
// - Mode flag from `?mode=` or the `x-canonstream-mode` header
// - Heartbeat endpoint
// - Every failure is one JSON error body, never a half-open stream

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::stream::StreamMode;

/// Header carrying the mode flag.
pub const MODE_HEADER: &str = "x-canonstream-mode";

/// Header echoing the request id on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Inbound request data handed to the upstream client.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub request_id: String,
    pub mode: StreamMode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Response produced by the upstream client.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Errors that end a request before any stream is returned.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream returned status {0}")]
    UpstreamStatus(StatusCode),

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("unknown stream mode \"{0}\"")]
    InvalidMode(String),
}

impl ProxyError {
    fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            // Upstream problems are reported generically; details go to logs.
            ProxyError::UpstreamFailure(_) | ProxyError::UpstreamStatus(_) => {
                (StatusCode::BAD_GATEWAY, "stream processing failed")
            }
            ProxyError::UpstreamTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, "stream processing failed")
            }
            ProxyError::MalformedJson(_) => {
                (StatusCode::BAD_REQUEST, "request body is not valid JSON")
            }
            ProxyError::EmptyBody => (StatusCode::BAD_REQUEST, "request body is empty"),
            ProxyError::InvalidMode(_) => (StatusCode::BAD_REQUEST, "unknown stream mode"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let (status, public_message) = self.status_and_message();
        error_response(status, public_message)
    }
}

/// A single structured error payload.
pub fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    let body = serde_json::json!({ "error": message }).to_string();
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Opens the upstream stream for a request and returns the response to
/// send back, body already transformed for the requested mode.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

// ---------------------------------------------------------------------------
// Mode selection
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct ModeQuery {
    mode: Option<String>,
}

/// Resolve the stream mode: query parameter first, then header, then the
/// configured default.
pub fn resolve_mode(
    uri: &Uri,
    headers: &HeaderMap,
    default: StreamMode,
) -> Result<StreamMode, ProxyError> {
    let from_query = match Query::<ModeQuery>::try_from_uri(uri) {
        Ok(Query(query)) => query.mode,
        Err(e) => return Err(ProxyError::InvalidMode(e.body_text())),
    };
    let from_header = || {
        headers
            .get(MODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    match from_query.or_else(from_header) {
        Some(value) => StreamMode::parse(&value).ok_or(ProxyError::InvalidMode(value)),
        None => Ok(default),
    }
}

/// Response headers for an event stream.
pub fn sse_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub default_mode: StreamMode,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// POST /v1/stream
///
/// Validates the body, resolves the mode, forwards via the injected
/// upstream client, and returns its streaming response.
pub async fn stream_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();
    let mut response = handle_stream(&state, request, &request_id).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

async fn handle_stream(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> axum::response::Response {
    let mode = match resolve_mode(request.uri(), request.headers(), state.default_mode) {
        Ok(m) => m,
        Err(e) => return e.into_response(),
    };
    let headers = request.headers().clone();

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(request_id, error = %e, "failed to read request body");
            return error_response(StatusCode::BAD_REQUEST, "failed to read request body");
        }
    };

    if body.is_empty() {
        return ProxyError::EmptyBody.into_response();
    }
    if let Err(e) = serde_json::from_slice::<serde_json::Value>(&body) {
        return ProxyError::MalformedJson(e.to_string()).into_response();
    }

    let proxy_req = ProxyRequest {
        request_id: request_id.to_string(),
        mode,
        headers,
        body,
    };

    match state.upstream.forward(proxy_req).await {
        Ok(resp) => {
            let mut response = Response::new(resp.body);
            *response.status_mut() = resp.status;
            *response.headers_mut() = resp.headers;
            response
        }
        Err(e) => {
            tracing::warn!(request_id, error = %e, "stream request failed");
            e.into_response()
        }
    }
}

/// Fallback for unknown paths.
pub async fn not_found() -> axum::response::Response {
    error_response(StatusCode::NOT_FOUND, "unknown path")
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the router. The upstream client is injected.
pub fn build_router(upstream: Arc<dyn UpstreamClient>, default_mode: StreamMode) -> Router {
    let state = AppState {
        upstream,
        default_mode,
    };

    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/stream", post(stream_handler))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt; // for oneshot

    // -----------------------------------------------------------------------
    // Mock upstream clients
    // -----------------------------------------------------------------------

    /// Echoes the resolved mode back as the body.
    struct ModeEchoClient;

    #[async_trait::async_trait]
    impl UpstreamClient for ModeEchoClient {
        async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
            Ok(ProxyResponse {
                status: StatusCode::OK,
                headers: sse_headers(),
                body: Body::from(request.mode.as_str()),
            })
        }
    }

    /// Always fails with the given error.
    struct FailingClient(fn() -> ProxyError);

    #[async_trait::async_trait]
    impl UpstreamClient for FailingClient {
        async fn forward(&self, _request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
            Err((self.0)())
        }
    }

    fn app(client: impl UpstreamClient + 'static) -> Router {
        build_router(Arc::new(client), StreamMode::Normalize)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_string(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn heartbeat_returns_200() {
        let req = Request::builder()
            .uri("/v1/heartbeat")
            .body(Body::empty())
            .unwrap();
        let resp = app(ModeEchoClient).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_404_json() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/other", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(resp).await, r#"{"error":"unknown path"}"#);
    }

    #[tokio::test]
    async fn stream_response_has_sse_headers_and_request_id() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/stream", r#"{"prompt":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
        assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    }

    // -----------------------------------------------------------------------
    // Mode flag
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn mode_defaults_to_configured_value() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/stream", "{}"))
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "normalize");
    }

    #[tokio::test]
    async fn mode_from_query() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/stream?x=1&mode=passthrough", "{}"))
            .await
            .unwrap();
        assert_eq!(body_string(resp).await, "passthrough");
    }

    #[tokio::test]
    async fn mode_from_header() {
        let mut req = post_json("/v1/stream", "{}");
        req.headers_mut()
            .insert(MODE_HEADER, HeaderValue::from_static("passthrough"));
        let resp = app(ModeEchoClient).oneshot(req).await.unwrap();
        assert_eq!(body_string(resp).await, "passthrough");
    }

    #[tokio::test]
    async fn unknown_mode_is_400() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/stream?mode=sideways", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    // -----------------------------------------------------------------------
    // Validation and failures
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn empty_body_is_400() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/stream", ""))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_400() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/stream", "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_string(resp).await,
            r#"{"error":"request body is not valid JSON"}"#
        );
    }

    #[tokio::test]
    async fn upstream_failure_is_generic_502() {
        let client = FailingClient(|| ProxyError::UpstreamFailure("dns: api.internal".into()));
        let resp = app(client)
            .oneshot(post_json("/v1/stream", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = body_string(resp).await;
        assert_eq!(body, r#"{"error":"stream processing failed"}"#);
        assert!(!body.contains("api.internal"));
    }

    #[tokio::test]
    async fn upstream_timeout_is_504() {
        let client = FailingClient(|| ProxyError::UpstreamTimeout("30s".into()));
        let resp = app(client)
            .oneshot(post_json("/v1/stream", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn percent_encoded_mode_is_decoded() {
        let resp = app(ModeEchoClient)
            .oneshot(post_json("/v1/stream?mode=pass%74hrough", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "passthrough");
    }

    #[test]
    fn resolve_mode_ignores_unrelated_query_params() {
        let uri: Uri = "/v1/stream?stream=true&foo".parse().unwrap();
        assert_eq!(
            resolve_mode(&uri, &HeaderMap::new(), StreamMode::Passthrough).unwrap(),
            StreamMode::Passthrough
        );
    }

    #[test]
    fn resolve_mode_prefers_query_over_header() {
        let uri: Uri = "/v1/stream?mode=normalize".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(MODE_HEADER, HeaderValue::from_static("passthrough"));
        assert_eq!(
            resolve_mode(&uri, &headers, StreamMode::Passthrough).unwrap(),
            StreamMode::Normalize
        );
    }
}
