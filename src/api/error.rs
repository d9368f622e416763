//! API errors
//!
//! Maps every failure onto the `{status, message, code}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::error::StoreError;
use crate::gate::GateError;

use super::model::{ErrorResponse, STATUS_ERROR};

/// Client-facing text for every 5xx
const INTERNAL_MESSAGE: &str = "Internal server error";

/// Failure detail attached to 5xx responses
///
/// The logging stage reads it to classify the request as failed and to
/// record what went wrong; it never reaches the client.
#[derive(Debug, Clone)]
pub struct HandlerFailure(pub String);

/// HTTP errors
#[derive(Debug, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    #[error("Key not found")]
    NotFound,

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    // ==================
    // Unavailable (503)
    // ==================
    #[error("Database is not connected")]
    GateClosed,

    // ==================
    // Server Errors (5xx)
    // ==================
    #[error("Storage failure: {0}")]
    Storage(StoreError),

    #[error("Internal fault: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound | ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::GateClosed => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show a client; engine diagnostics stay server-side
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Storage(_) | ApiError::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            other => ApiError::Storage(other),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            status: STATUS_ERROR.to_string(),
            message: self.client_message(),
            code: status.as_u16(),
        };

        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            response
                .extensions_mut()
                .insert(HandlerFailure(self.to_string()));
        }
        response
    }
}
