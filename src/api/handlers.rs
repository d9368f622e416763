//! Endpoint handlers
//!
//! Every data handler runs the same sequence: gate check, key check, body
//! parse, storage call, envelope. The order matters: a closed gate answers
//! 503 before anything about the request is inspected.
//!
//! Handlers do not `.await` once they hold a [`GateGuard`]; the guard is a
//! blocking read lock and must not cross a suspension point.

use std::collections::BTreeMap;

use axum::extract::path::ErrorKind;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::Uri;
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::gate::{CloseOutcome, ConnectOutcome, ConnectionCredentials, GateGuard};

use super::error::ApiError;
use super::model::{
    ConnectRequest, DbStatusResponse, HealthResponse, KeyResponse, KeyValueResponse, ListResponse,
    Response, SetValueRequest, STATUS_SUCCESS,
};
use super::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Helpers
// =============================================================================

/// Admit a data operation, or refuse it while the gate is closed
fn admit(state: &AppState) -> Result<GateGuard<'_>, ApiError> {
    state.gate.enter().ok_or_else(|| {
        tracing::warn!("data operation refused: database is not connected");
        ApiError::GateClosed
    })
}

/// Path key extractor; rejections are classified by `require_key`
type KeyParam = Result<Path<String>, PathRejection>;

/// The path key, rejecting an absent, empty or undecodable one
fn require_key(key: KeyParam) -> Result<String, ApiError> {
    match key {
        Ok(Path(key)) if !key.is_empty() => Ok(key),
        Err(PathRejection::FailedToDeserializePathParams(e))
            if matches!(e.kind(), ErrorKind::InvalidUtf8InPathParam { .. }) =>
        {
            tracing::warn!(error = %e.body_text(), "key path parameter is not valid UTF-8");
            Err(ApiError::Validation(
                "Invalid key: not valid UTF-8 after percent-decoding".to_string(),
            ))
        }
        _ => {
            tracing::warn!("request is missing the key path parameter");
            Err(ApiError::Validation("Key is required".to_string()))
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "rejecting malformed request body");
        ApiError::Validation(format!("Invalid request: {}", e))
    })
}

fn render(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// =============================================================================
// Health
// =============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::RouteNotFound(uri.path().to_string())
}

// =============================================================================
// Key-Value Operations
// =============================================================================

/// `GET /kv/{key}`
pub async fn get_key(
    State(state): State<AppState>,
    key: KeyParam,
) -> ApiResult<KeyValueResponse> {
    let _open = admit(&state)?;
    let key = require_key(key)?;

    tracing::debug!(%key, "fetching key");
    let value = state.store.get(key.as_bytes()).map_err(|e| {
        if e.is_not_found() {
            tracing::debug!(%key, "key not found");
        } else {
            tracing::error!(%key, error = %e, "failed to read key");
        }
        ApiError::from(e)
    })?;

    tracing::info!(%key, value_size = value.len(), "key fetched");
    Ok(Json(KeyValueResponse {
        key,
        value: render(&value),
    }))
}

/// `PUT /kv/{key}` with `{"value": ...}`
pub async fn set_key(
    State(state): State<AppState>,
    key: KeyParam,
    body: Bytes,
) -> ApiResult<Response<KeyValueResponse>> {
    let _open = admit(&state)?;
    let key = require_key(key)?;
    let request: SetValueRequest = parse_body(&body)?;

    tracing::debug!(%key, value_size = request.value.len(), "storing key");
    state
        .store
        .put(key.as_bytes(), request.value.as_bytes())
        .map_err(|e| {
            tracing::error!(%key, error = %e, "failed to store key");
            ApiError::Storage(e)
        })?;

    tracing::info!(%key, "key stored");
    Ok(Json(Response::success(
        "Value stored successfully",
        KeyValueResponse {
            key,
            value: request.value,
        },
    )))
}

/// `DELETE /kv/{key}`
///
/// A single engine call both checks existence and deletes.
pub async fn delete_key(
    State(state): State<AppState>,
    key: KeyParam,
) -> ApiResult<Response<KeyResponse>> {
    let _open = admit(&state)?;
    let key = require_key(key)?;

    state.store.delete(key.as_bytes()).map_err(|e| {
        if e.is_not_found() {
            tracing::debug!(%key, "delete of absent key");
        } else {
            tracing::error!(%key, error = %e, "failed to delete key");
        }
        ApiError::from(e)
    })?;

    tracing::info!(%key, "key deleted");
    Ok(Json(Response::success(
        "Key deleted successfully",
        KeyResponse { key },
    )))
}

/// `GET /kvs`
///
/// Lists keys, then fetches each value. The two steps are not atomic: a key
/// deleted in between fails the whole listing with a 500 instead of being
/// silently dropped.
pub async fn list_keys(State(state): State<AppState>) -> ApiResult<ListResponse> {
    let _open = admit(&state)?;

    let keys = state.store.list_keys().map_err(|e| {
        tracing::error!(error = %e, "failed to list keys");
        ApiError::Storage(e)
    })?;
    tracing::debug!(total_keys = keys.len(), "listing keys");

    let mut items = BTreeMap::new();
    for key in keys {
        let value = state.store.get(&key).map_err(|e| {
            tracing::error!(key = %render(&key), error = %e, "failed to fetch listed key");
            ApiError::Storage(e)
        })?;
        items.insert(render(&key), render(&value));
    }

    Ok(Json(ListResponse {
        total: items.len(),
        items,
    }))
}

// =============================================================================
// Connection Gate
// =============================================================================

/// `POST /db/connect`
pub async fn connect(State(state): State<AppState>, body: Bytes) -> ApiResult<Response<()>> {
    let request: ConnectRequest = parse_body(&body)?;
    let credentials = ConnectionCredentials::from(request);

    if let Some(field) = credentials.first_missing() {
        tracing::warn!(%field, "connect request is missing a field");
        return Err(ApiError::Validation(format!("{} is required", field)));
    }

    match state.gate.connect(&credentials) {
        Ok(ConnectOutcome::AlreadyConnected) => {
            tracing::debug!("connect while already connected");
            Ok(Json(Response::message("Database is already connected")))
        }
        Ok(ConnectOutcome::Connected) => {
            tracing::info!(
                host = %credentials.host,
                port = %credentials.port,
                username = %credentials.username,
                "database connected"
            );
            Ok(Json(Response::message("Database connected successfully")))
        }
        Err(e) => {
            tracing::warn!(
                host = %credentials.host,
                port = %credentials.port,
                username = %credentials.username,
                reason = %e,
                "connect refused"
            );
            Err(e.into())
        }
    }
}

/// `GET /db/status`
pub async fn db_status(State(state): State<AppState>) -> ApiResult<DbStatusResponse> {
    let details = state.gate.details().ok_or_else(|| {
        tracing::warn!("status requested while database is not connected");
        ApiError::GateClosed
    })?;

    Ok(Json(DbStatusResponse {
        status: STATUS_SUCCESS.to_string(),
        message: "Database is connected".to_string(),
        details: details.into(),
    }))
}

/// `POST /db/close`
pub async fn close(State(state): State<AppState>) -> Json<Response<()>> {
    match state.gate.close() {
        CloseOutcome::AlreadyClosed => Json(Response::message("Database is already closed")),
        CloseOutcome::Closed => {
            tracing::info!("database closed");
            Json(Response::message("Database closed successfully"))
        }
    }
}
