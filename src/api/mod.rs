//! HTTP API
//!
//! Routes, handlers and the request pipeline.
//!
//! | Method & Path              | Handler      |
//! |----------------------------|--------------|
//! | `GET /health`              | `health`     |
//! | `GET /api/v1/kv/{key}`     | `get_key`    |
//! | `PUT /api/v1/kv/{key}`     | `set_key`    |
//! | `DELETE /api/v1/kv/{key}`  | `delete_key` |
//! | `GET /api/v1/kvs`          | `list_keys`  |
//! | `POST /api/v1/db/connect`  | `connect`    |
//! | `GET /api/v1/db/status`    | `db_status`  |
//! | `POST /api/v1/db/close`    | `close`      |

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod model;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::gate::Gate;
use crate::storage::KvStore;

pub use error::{ApiError, HandlerFailure};
pub use middleware::{MakeCorrelationId, RequestContext, REQUEST_ID_HEADER};

/// Common prefix of every data and gate route
pub const API_PREFIX: &str = "/api/v1";

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<KvStore>,
    pub gate: Arc<Gate>,
}

impl AppState {
    pub fn new(store: Arc<KvStore>, gate: Arc<Gate>) -> Self {
        Self { store, gate }
    }
}

/// Build the full application: routes wrapped in the request pipeline
pub fn router(state: AppState) -> Router {
    // `/kv/` is routed so an empty key reaches the handler and answers 400
    let api = Router::new()
        .route(
            "/kv/",
            get(handlers::get_key)
                .put(handlers::set_key)
                .delete(handlers::delete_key),
        )
        .route(
            "/kv/:key",
            get(handlers::get_key)
                .put(handlers::set_key)
                .delete(handlers::delete_key),
        )
        .route("/kvs", get(handlers::list_keys))
        .route("/db/connect", post(handlers::connect))
        .route("/db/status", get(handlers::db_status))
        .route("/db/close", post(handlers::close));

    Router::new()
        .route("/health", get(handlers::health))
        .nest(API_PREFIX, api)
        .fallback(handlers::route_not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeCorrelationId))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(axum::middleware::from_fn(middleware::log_requests))
                .layer(CatchPanicLayer::custom(middleware::recover_panic))
                .layer(axum::middleware::from_fn(middleware::cors)),
        )
}
