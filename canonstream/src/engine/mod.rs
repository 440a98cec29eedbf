// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Relay engine
//
// Wires the HTTP surface to the stream pipeline:
// - Build the upstream request (configured URL, headers, timeout)
// - Open the upstream byte stream
// - Fail fast on transport errors and non-2xx statuses
// - Hand the byte stream to StreamProcessor in the requested mode
// - Return the processed stream as the response body

use crate::config::Config;
use crate::proxy::{sse_headers, ProxyError, ProxyRequest, ProxyResponse, UpstreamClient};
use crate::stream::{StreamMode, StreamProcessor, UpstreamError};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use futures_util::TryStreamExt;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// Sends one upstream request and returns its streaming response.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout_ms: Option<u64>,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

impl From<HttpError> for UpstreamError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Transport(msg) => UpstreamError::Transport(msg),
            HttpError::Timeout(msg) => UpstreamError::Timeout(msg),
        }
    }
}

impl From<HttpError> for ProxyError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Transport(msg) => ProxyError::UpstreamFailure(msg),
            HttpError::Timeout(msg) => ProxyError::UpstreamTimeout(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Relay dependencies
// ---------------------------------------------------------------------------

pub struct RelayDeps {
    pub config: Arc<Config>,
    pub http: Arc<dyn HttpSender>,
    pub processor: StreamProcessor,
}

// ---------------------------------------------------------------------------
// RelayEngine
// ---------------------------------------------------------------------------

/// Upstream client that relays to the configured upstream and normalizes
/// its event stream.
pub struct RelayEngine {
    deps: RelayDeps,
    upstream_headers: HeaderMap,
}

impl RelayEngine {
    pub fn new_with(deps: RelayDeps) -> Self {
        let upstream_headers = build_upstream_headers(&deps.config);
        Self {
            deps,
            upstream_headers,
        }
    }

    fn upstream_request(&self, request: &ProxyRequest) -> HttpRequest {
        let mut headers = self.upstream_headers.clone();

        // Caller credentials go through unless the config pins its own.
        if !headers.contains_key(header::AUTHORIZATION) {
            if let Some(auth) = request.headers.get(header::AUTHORIZATION) {
                headers.insert(header::AUTHORIZATION, auth.clone());
            }
        }

        HttpRequest {
            method: Method::POST,
            url: self.deps.config.upstream.url.clone(),
            headers,
            body: request.body.clone(),
            timeout_ms: self.deps.config.upstream.timeout_ms,
        }
    }
}

#[async_trait]
impl UpstreamClient for RelayEngine {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let span = tracing::info_span!(
            "stream",
            request_id = %request.request_id,
            mode = request.mode.as_str(),
        );
        self.relay(request).instrument(span).await
    }
}

impl RelayEngine {
    async fn relay(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let start = Instant::now();
        let mode = request.mode;

        let upstream = self.deps.http.send(self.upstream_request(&request)).await;
        let upstream = match upstream {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "upstream request failed");
                return Err(e.into());
            }
        };

        if !upstream.status.is_success() {
            tracing::warn!(
                status = upstream.status.as_u16(),
                latency_ms = start.elapsed().as_millis() as u64,
                "upstream returned non-success status"
            );
            return Err(ProxyError::UpstreamStatus(upstream.status));
        }

        tracing::info!(
            status = upstream.status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "upstream stream opened"
        );

        let input = upstream.body.map_err(UpstreamError::from);
        let output = self.deps.processor.process(input, mode);

        Ok(ProxyResponse {
            status: StatusCode::OK,
            headers: response_headers(mode, &upstream.headers),
            body: Body::from_stream(output.map(Ok::<Bytes, Infallible>)),
        })
    }
}

// ---------------------------------------------------------------------------
// Reqwest-based HttpSender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout_ms) = request.timeout_ms {
            req = req.timeout(std::time::Duration::from_millis(timeout_ms));
        }

        let resp = req.send().await.map_err(map_reqwest_error)?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let stream = resp.bytes_stream().map_err(map_reqwest_error);

        Ok(HttpResponse {
            status,
            headers,
            body: Box::pin(stream),
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout(e.to_string())
    } else {
        HttpError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Public factory for the default relay client
// ---------------------------------------------------------------------------

pub fn build_relay_client(config: Arc<Config>) -> RelayEngine {
    let processor = StreamProcessor::new(config.normalizer.build());
    let deps = RelayDeps {
        config,
        http: Arc::new(ReqwestHttpSender::new(reqwest::Client::new())),
        processor,
    };

    RelayEngine::new_with(deps)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fixed request headers plus the configured extras. Names and values were
/// checked when the config loaded, so anything unparsable here is skipped.
fn build_upstream_headers(config: &Config) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
    // The pipeline reads raw event bytes; compressed bodies would not parse.
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    for (name, value) in &config.upstream.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "skipping unsendable upstream header"),
        }
    }
    headers
}

/// SSE headers for the client. Passthrough keeps the upstream content type.
fn response_headers(mode: StreamMode, upstream: &HeaderMap) -> HeaderMap {
    let mut headers = sse_headers();
    if mode == StreamMode::Passthrough {
        if let Some(ct) = upstream.get(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, ct.clone());
        }
    }
    headers
}
