//! Request pipeline
//!
//! Stages, outermost first:
//!
//! ```text
//!   SetRequestId ─▶ PropagateRequestId ─▶ log_requests ─▶ CatchPanic ─▶ cors ─▶ router
//! ```
//!
//! - Correlation ID: reuse an incoming `x-request-id`, else mint a UUID; the
//!   ID is echoed on the response.
//! - Logging: buffer the body, run the request, emit exactly one record.
//! - Recovery: a panic below becomes a 500 and the process keeps serving.
//! - CORS: permissive headers everywhere; `OPTIONS` answers 204 before any
//!   handler or gate logic.

use std::any::Any;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Instrument;
use uuid::Uuid;

use super::error::{ApiError, HandlerFailure};

/// Header carrying the correlation ID in both directions
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest request body the logging stage will buffer (2 MiB)
pub const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

const ALLOW_HEADERS: &str = "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, \
Authorization, accept, origin, Cache-Control, X-Requested-With";
const ALLOW_METHODS: &str = "POST, OPTIONS, GET, PUT, DELETE";

// =============================================================================
// CORRELATION ID
// =============================================================================

/// Mints UUID v4 correlation IDs for requests that arrive without one
#[derive(Clone, Copy, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// LOGGING
// =============================================================================

/// Per-request facts collected before the handler runs
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub client_addr: String,
    pub method: Method,
    pub path: String,
    pub query: String,
    pub started: Instant,
}

impl RequestContext {
    pub fn capture(request: &Request) -> Self {
        let correlation_id = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .or_else(|| {
                request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
            })
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            correlation_id,
            client_addr: client_addr(request),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().unwrap_or_default().to_string(),
            started: Instant::now(),
        }
    }

    /// Emit the single record for this request
    ///
    /// Error level when the handler reported a failure (body and error
    /// included), warning for any other status >= 400, info otherwise.
    pub fn finish(&self, response: &Response, body: &[u8]) {
        let latency: Duration = self.started.elapsed();
        let status = response.status().as_u16();

        if let Some(HandlerFailure(error)) = response.extensions().get::<HandlerFailure>() {
            tracing::error!(
                request_id = %self.correlation_id,
                client = %self.client_addr,
                method = %self.method,
                path = %self.path,
                query = %self.query,
                body = %String::from_utf8_lossy(body),
                error = %error,
                ?latency,
                status,
                "request failed"
            );
        } else if status >= 400 {
            tracing::warn!(
                request_id = %self.correlation_id,
                client = %self.client_addr,
                method = %self.method,
                path = %self.path,
                query = %self.query,
                ?latency,
                status,
                "request returned an error status"
            );
        } else {
            tracing::info!(
                request_id = %self.correlation_id,
                client = %self.client_addr,
                method = %self.method,
                path = %self.path,
                query = %self.query,
                ?latency,
                status,
                "request handled"
            );
        }
    }
}

/// Client address: first forwarded hop, then the real-ip header, then the peer
fn client_addr(request: &Request) -> String {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    if let Some(addr) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return addr.trim().to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Buffer the body, run the rest of the pipeline, log the outcome
pub async fn log_requests(request: Request, next: Next) -> Response {
    let ctx = RequestContext::capture(&request);
    let span = tracing::info_span!("request", id = %ctx.correlation_id);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let error = if exceeds_limit(&e) {
                ApiError::PayloadTooLarge(MAX_BUFFERED_BODY)
            } else {
                ApiError::Validation(format!("Failed to read request body: {}", e))
            };
            let mut response = error.into_response();
            apply_cors_headers(response.headers_mut());
            ctx.finish(&response, &[]);
            return response;
        }
    };

    let request = Request::from_parts(parts, Body::from(body.clone()));
    let response = next.run(request).instrument(span).await;

    ctx.finish(&response, &body);
    response
}

/// Whether a body read failed on the buffering limit rather than on I/O
fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

// =============================================================================
// RECOVERY
// =============================================================================

/// Turn a caught panic into a 500
///
/// The panic hook installed by `telemetry` has already logged the location
/// and backtrace; this records the payload and builds the response.
pub fn recover_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "non-string panic payload".to_string()
    };

    tracing::error!(panic = %detail, "handler panicked, request aborted");

    let mut response = ApiError::Internal(format!("panic: {}", detail)).into_response();
    apply_cors_headers(response.headers_mut());
    response
}

// =============================================================================
// CORS
// =============================================================================

/// Permissive CORS; preflight never reaches the router
pub async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    apply_cors_headers(response.headers_mut());
    response
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    let pairs: [(HeaderName, &'static str); 4] = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
        (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
    ];
    for (name, value) in pairs {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

