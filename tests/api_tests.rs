//! Tests for the HTTP API
//!
//! These tests verify:
//! - Gate check happens before any input validation or storage call
//! - Key-value endpoints and their envelopes
//! - Connect/status/close endpoints
//! - Request pipeline: correlation IDs, CORS preflight, panic recovery
//! - 5xx responses never leak engine diagnostics

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use kvgate::api::{self, AppState, HandlerFailure};
use kvgate::engine::{MemoryEngine, StorageEngine, Visitor};
use kvgate::error::{StoreError, StoreResult};
use kvgate::gate::{ConnectionCredentials, Gate};
use kvgate::storage::KvStore;
use serde_json::{json, Value};
use tower::ServiceExt;

// =============================================================================
// Helper Types
// =============================================================================

/// Memory engine with call counting and scripted faults
#[derive(Default)]
struct FaultyEngine {
    inner: MemoryEngine,
    calls: Arc<AtomicUsize>,

    /// `put` fails with an I/O error
    fail_writes: bool,

    /// `get` of this key panics
    panic_key: Option<Vec<u8>>,

    /// `list_keys` reports this key although it is not stored
    phantom_key: Option<Vec<u8>>,
}

impl FaultyEngine {
    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl StorageEngine for FaultyEngine {
    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.touch();
        if self.panic_key.as_deref() == Some(key) {
            panic!("engine exploded on {:?}", String::from_utf8_lossy(key));
        }
        self.inner.get(key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.touch();
        if self.fail_writes {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk on fire at /var/secret/kv.wal",
            )));
        }
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.touch();
        self.inner.delete(key)
    }

    fn fold(&self, visitor: &mut Visitor<'_>) -> StoreResult<()> {
        self.touch();
        self.inner.fold(visitor)
    }

    fn list_keys(&self) -> StoreResult<Vec<Vec<u8>>> {
        self.touch();
        let mut keys = self.inner.list_keys()?;
        keys.extend(self.phantom_key.clone());
        Ok(keys)
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.touch();
        self.inner.sync()
    }

    fn close(&mut self) -> StoreResult<()> {
        self.touch();
        self.inner.close()
    }
}

struct TestApp {
    router: Router,
    calls: Arc<AtomicUsize>,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    failure: Option<HandlerFailure>,
    body: Value,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn credentials() -> Value {
    json!({
        "host": "0.0.0.0",
        "port": "8080",
        "username": "admin",
        "password": "admin",
    })
}

fn setup_app_with(engine: FaultyEngine) -> TestApp {
    let calls = Arc::clone(&engine.calls);
    let store = Arc::new(KvStore::new(Box::new(engine)));
    let gate = Arc::new(Gate::new(ConnectionCredentials {
        host: "0.0.0.0".to_string(),
        port: "8080".to_string(),
        username: "admin".to_string(),
        password: "admin".to_string(),
    }));

    TestApp {
        router: api::router(AppState::new(store, gate)),
        calls,
    }
}

fn setup_app() -> TestApp {
    setup_app_with(FaultyEngine::default())
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let failure = response.extensions().get::<HandlerFailure>().cloned();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse {
            status,
            headers,
            failure,
            body,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        self.send(builder.body(body).unwrap()).await
    }

    async fn get(&self, uri: &str) -> TestResponse {
        self.call(Method::GET, uri, None).await
    }

    async fn put_value(&self, key: &str, value: &str) -> TestResponse {
        let body = json!({ "value": value }).to_string();
        self.call(Method::PUT, &format!("/api/v1/kv/{}", key), Some(&body))
            .await
    }

    async fn connect(&self) {
        let response = self
            .call(
                Method::POST,
                "/api/v1/db/connect",
                Some(&credentials().to_string()),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn assert_error(response: &TestResponse, status: StatusCode, message: &str) {
    assert_eq!(response.status, status);
    assert_eq!(
        response.body,
        json!({ "status": "error", "message": message, "code": status.as_u16() })
    );
}

// =============================================================================
// Health and Routing Tests
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = setup_app();

    let response = app.get("/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "status": "ok" }));
    assert_eq!(app.calls(), 0);
}

#[tokio::test]
async fn test_unknown_route_gets_error_envelope() {
    let app = setup_app();

    let response = app.get("/nope").await;

    assert_error(&response, StatusCode::NOT_FOUND, "Route not found: /nope");
}

// =============================================================================
// Gate Ordering Tests
// =============================================================================

#[tokio::test]
async fn test_data_operations_refused_while_stopped() {
    let app = setup_app();

    for (method, uri, body) in [
        (Method::GET, "/api/v1/kv/foo", None),
        (Method::PUT, "/api/v1/kv/foo", Some(r#"{"value":"bar"}"#)),
        (Method::DELETE, "/api/v1/kv/foo", None),
        (Method::GET, "/api/v1/kvs", None),
        (Method::GET, "/api/v1/db/status", None),
    ] {
        let response = app.call(method, uri, body).await;
        assert_error(
            &response,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database is not connected",
        );
    }

    assert_eq!(app.calls(), 0);
}

#[tokio::test]
async fn test_gate_is_checked_before_input() {
    let app = setup_app();

    let missing_key = app.get("/api/v1/kv/").await;
    let bad_body = app
        .call(Method::PUT, "/api/v1/kv/foo", Some("{ not json"))
        .await;

    assert_eq!(missing_key.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(bad_body.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_empty_key_rejected_without_storage_call() {
    let app = setup_app();
    app.connect().await;

    let get = app.get("/api/v1/kv/").await;
    let put = app
        .call(Method::PUT, "/api/v1/kv/", Some(r#"{"value":"v"}"#))
        .await;
    let delete = app.call(Method::DELETE, "/api/v1/kv/", None).await;

    assert_error(&get, StatusCode::BAD_REQUEST, "Key is required");
    assert_error(&put, StatusCode::BAD_REQUEST, "Key is required");
    assert_error(&delete, StatusCode::BAD_REQUEST, "Key is required");
    assert_eq!(app.calls(), 0);
}

#[tokio::test]
async fn test_undecodable_key_is_invalid_not_missing() {
    let app = setup_app();
    app.connect().await;

    let response = app.get("/api/v1/kv/%FF").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid key"));
    assert_eq!(app.calls(), 0);
}

// =============================================================================
// Key-Value Tests
// =============================================================================

#[tokio::test]
async fn test_set_then_get() {
    let app = setup_app();
    app.connect().await;

    let stored = app.put_value("foo", "bar").await;
    assert_eq!(stored.status, StatusCode::OK);
    assert_eq!(
        stored.body,
        json!({
            "status": "success",
            "message": "Value stored successfully",
            "data": { "key": "foo", "value": "bar" },
        })
    );

    let fetched = app.get("/api/v1/kv/foo").await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body, json!({ "key": "foo", "value": "bar" }));
}

#[tokio::test]
async fn test_overwrite_replaces_value() {
    let app = setup_app();
    app.connect().await;

    app.put_value("foo", "one").await;
    app.put_value("foo", "two").await;

    assert_eq!(app.get("/api/v1/kv/foo").await.body["value"], "two");
}

#[tokio::test]
async fn test_empty_string_is_a_valid_value() {
    let app = setup_app();
    app.connect().await;

    assert_eq!(app.put_value("blank", "").await.status, StatusCode::OK);

    let fetched = app.get("/api/v1/kv/blank").await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["value"], "");
}

#[tokio::test]
async fn test_set_rejects_missing_or_null_value() {
    let app = setup_app();
    app.connect().await;

    for body in ["{}", r#"{"value":null}"#, r#"{"value":42}"#, "", "{ nope"] {
        let response = app.call(Method::PUT, "/api/v1/kv/foo", Some(body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert!(response.body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request"));
    }

    assert_eq!(app.calls(), 0);
}

#[tokio::test]
async fn test_get_missing_key() {
    let app = setup_app();
    app.connect().await;

    let response = app.get("/api/v1/kv/ghost").await;

    assert_error(&response, StatusCode::NOT_FOUND, "Key not found");
    assert!(response.failure.is_none());
}

#[tokio::test]
async fn test_delete() {
    let app = setup_app();
    app.connect().await;
    app.put_value("foo", "bar").await;

    let deleted = app.call(Method::DELETE, "/api/v1/kv/foo", None).await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(
        deleted.body,
        json!({
            "status": "success",
            "message": "Key deleted successfully",
            "data": { "key": "foo" },
        })
    );

    assert_eq!(app.get("/api/v1/kv/foo").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_missing_key() {
    let app = setup_app();
    app.connect().await;

    let response = app.call(Method::DELETE, "/api/v1/kv/ghost", None).await;

    assert_error(&response, StatusCode::NOT_FOUND, "Key not found");
    assert_eq!(app.calls(), 1);
}

#[tokio::test]
async fn test_list_empty() {
    let app = setup_app();
    app.connect().await;

    let response = app.get("/api/v1/kvs").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "total": 0, "items": {} }));
}

#[tokio::test]
async fn test_list_returns_every_pair() {
    let app = setup_app();
    app.connect().await;
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
        app.put_value(k, v).await;
    }

    let response = app.get("/api/v1/kvs").await;

    assert_eq!(
        response.body,
        json!({ "total": 3, "items": { "a": "1", "b": "2", "c": "3" } })
    );
}

// =============================================================================
// Connection Gate Tests
// =============================================================================

#[tokio::test]
async fn test_connect_status_close_cycle() {
    let app = setup_app();

    let body = credentials().to_string();
    let first = app.call(Method::POST, "/api/v1/db/connect", Some(&body)).await;
    assert_eq!(
        first.body,
        json!({ "status": "success", "message": "Database connected successfully" })
    );

    let second = app.call(Method::POST, "/api/v1/db/connect", Some(&body)).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["message"], "Database is already connected");

    let status = app.get("/api/v1/db/status").await;
    assert_eq!(
        status.body,
        json!({
            "status": "success",
            "message": "Database is connected",
            "details": { "host": "0.0.0.0", "port": "8080", "username": "admin" },
        })
    );

    let closed = app.call(Method::POST, "/api/v1/db/close", None).await;
    assert_eq!(closed.body["message"], "Database closed successfully");

    let again = app.call(Method::POST, "/api/v1/db/close", None).await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["message"], "Database is already closed");

    assert_eq!(
        app.get("/api/v1/kv/foo").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_second_connect_leaves_stored_keys_alone() {
    let app = setup_app();
    app.connect().await;
    app.put_value("k", "v").await;
    let before = app.calls();

    let body = credentials().to_string();
    let again = app.call(Method::POST, "/api/v1/db/connect", Some(&body)).await;

    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.body["message"], "Database is already connected");
    assert_eq!(app.calls(), before);

    assert_eq!(app.get("/api/v1/kv/k").await.body["value"], "v");
    let listed = app.get("/api/v1/kvs").await;
    assert_eq!(listed.body, json!({ "total": 1, "items": { "k": "v" } }));
}

#[tokio::test]
async fn test_connect_with_wrong_port() {
    let app = setup_app();
    let mut body = credentials();
    body["port"] = json!("9999");

    let response = app
        .call(Method::POST, "/api/v1/db/connect", Some(&body.to_string()))
        .await;

    assert_error(&response, StatusCode::BAD_REQUEST, "Invalid port");
    assert_eq!(
        app.get("/api/v1/db/status").await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_connect_with_empty_field() {
    let app = setup_app();
    let mut body = credentials();
    body["username"] = json!("");

    let response = app
        .call(Method::POST, "/api/v1/db/connect", Some(&body.to_string()))
        .await;

    assert_error(&response, StatusCode::BAD_REQUEST, "username is required");
}

#[tokio::test]
async fn test_connect_with_bad_body() {
    let app = setup_app();

    for body in [None, Some("{ nope"), Some(r#"{"host":"0.0.0.0"}"#)] {
        let response = app.call(Method::POST, "/api/v1/db/connect", body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "body {:?}", body);
    }
}

#[tokio::test]
async fn test_close_does_not_touch_storage() {
    let app = setup_app();
    app.connect().await;

    app.call(Method::POST, "/api/v1/db/close", None).await;

    assert_eq!(app.calls(), 0);
}

// =============================================================================
// Pipeline Tests
// =============================================================================

#[tokio::test]
async fn test_preflight_short_circuits() {
    let app = setup_app();

    for uri in ["/api/v1/kv/foo", "/api/v1/db/connect", "/nonexistent"] {
        let response = app.call(Method::OPTIONS, uri, None).await;

        assert_eq!(response.status, StatusCode::NO_CONTENT, "uri {}", uri);
        assert_eq!(
            response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(
            response.headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "POST, OPTIONS, GET, PUT, DELETE"
        );
        assert_eq!(
            response.headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
        assert!(response.headers.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    }

    assert_eq!(app.calls(), 0);
}

#[tokio::test]
async fn test_cors_headers_on_every_response() {
    let app = setup_app();

    let ok = app.get("/health").await;
    let refused = app.get("/api/v1/kvs").await;

    assert_eq!(ok.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(refused.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_request_id_minted_when_absent() {
    let app = setup_app();

    let response = app.get("/health").await;

    let id = response.headers[api::REQUEST_ID_HEADER].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_request_id_echoed_when_present() {
    let app = setup_app();
    let request = Request::builder()
        .uri("/health")
        .header(api::REQUEST_ID_HEADER, "trace-abc-123")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.headers[api::REQUEST_ID_HEADER], "trace-abc-123");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = setup_app();
    app.connect().await;
    let huge = format!(r#"{{"value":"{}"}}"#, "x".repeat(3 * 1024 * 1024));

    let response = app.call(Method::PUT, "/api/v1/kv/big", Some(&huge)).await;

    assert_error(
        &response,
        StatusCode::PAYLOAD_TOO_LARGE,
        "Request body exceeds 2097152 bytes",
    );
    assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(response.headers.contains_key(api::REQUEST_ID_HEADER));
    assert_eq!(app.calls(), 0);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_storage_failure_is_generic_500() {
    let app = setup_app_with(FaultyEngine {
        fail_writes: true,
        ..FaultyEngine::default()
    });
    app.connect().await;

    let response = app.put_value("foo", "bar").await;

    assert_error(
        &response,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
    );
    assert!(!response.body.to_string().contains("/var/secret"));
    let failure = response.failure.expect("5xx carries the failure detail");
    assert!(failure.0.contains("disk on fire"));
}

#[tokio::test]
async fn test_panic_is_recovered() {
    let app = setup_app_with(FaultyEngine {
        panic_key: Some(b"boom".to_vec()),
        ..FaultyEngine::default()
    });
    app.connect().await;

    let response = app.get("/api/v1/kv/boom").await;

    assert_error(
        &response,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
    );
    assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(response.headers.contains_key(api::REQUEST_ID_HEADER));

    // The service keeps working, locks included
    assert_eq!(app.put_value("after", "ok").await.status, StatusCode::OK);
    assert_eq!(app.get("/api/v1/kv/after").await.body["value"], "ok");
    assert_eq!(
        app.call(Method::POST, "/api/v1/db/close", None).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_key_vanishing_during_list_fails_listing() {
    let app = setup_app_with(FaultyEngine {
        phantom_key: Some(b"ghost".to_vec()),
        ..FaultyEngine::default()
    });
    app.connect().await;
    app.put_value("real", "1").await;

    let response = app.get("/api/v1/kvs").await;

    assert_error(
        &response,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
    );
    assert!(response.failure.is_some());
}
