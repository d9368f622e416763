//! Request and response bodies
//!
//! Every JSON shape the HTTP surface reads or writes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gate::{ConnectionCredentials, ConnectionDetails};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

// =============================================================================
// Requests
// =============================================================================

/// Body of `PUT /kv/{key}`; an empty string is a valid value
#[derive(Debug, Deserialize)]
pub struct SetValueRequest {
    pub value: String,
}

/// Body of `POST /db/connect`
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

impl From<ConnectRequest> for ConnectionCredentials {
    fn from(req: ConnectRequest) -> Self {
        Self {
            host: req.host,
            port: req.port,
            username: req.username,
            password: req.password,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValueResponse {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyResponse {
    pub key: String,
}

/// Generic success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct Response<T> {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl Response<()> {
    /// Success envelope without a `data` member
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            message: message.into(),
            data: None,
        }
    }
}

/// Error envelope shared by every failure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub code: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub total: usize,
    pub items: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DbStatusResponse {
    pub status: String,
    pub message: String,
    pub details: Detail,
}

/// Connection details without the password
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Detail {
    pub host: String,
    pub port: String,
    pub username: String,
}

impl From<ConnectionDetails> for Detail {
    fn from(details: ConnectionDetails) -> Self {
        Self {
            host: details.host,
            port: details.port,
            username: details.username,
        }
    }
}
