//! Connection Gate
//!
//! Two-state machine deciding whether data operations may run.
//!
//! ```text
//!            connect (all four fields match)
//!   Stopped ─────────────────────────────────▶ Running
//!      ▲                                          │
//!      └──────────────── close ───────────────────┘
//! ```
//!
//! ## Concurrency
//! The status lives behind a `parking_lot::RwLock`. Transitions take the
//! write lock; data operations hold a read guard ([`GateGuard`]) for as long
//! as they touch storage. A `close` therefore waits for in-flight data
//! operations, and no data operation starts after `close` returns.

use std::fmt;

use parking_lot::{RwLock, RwLockReadGuard};
use thiserror::Error;

use crate::config::Config;

/// Whether the service currently accepts data operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceStatus {
    #[default]
    Stopped,
    Running,
}

/// One of the four credential fields, in validation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Host,
    Port,
    Username,
    Password,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialField::Host => "host",
            CredentialField::Port => "port",
            CredentialField::Username => "username",
            CredentialField::Password => "password",
        };
        f.write_str(name)
    }
}

/// Credentials presented by a connect request, or the configured reference
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionCredentials {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

impl ConnectionCredentials {
    /// Reference credentials derived from the configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port.clone(),
            username: config.gate.username.clone(),
            password: config.gate.password.clone(),
        }
    }

    /// First empty field, in validation order
    pub fn first_missing(&self) -> Option<CredentialField> {
        self.fields()
            .into_iter()
            .find(|(_, value)| value.is_empty())
            .map(|(field, _)| field)
    }

    fn fields(&self) -> [(CredentialField, &str); 4] {
        [
            (CredentialField::Host, self.host.as_str()),
            (CredentialField::Port, self.port.as_str()),
            (CredentialField::Username, self.username.as_str()),
            (CredentialField::Password, self.password.as_str()),
        ]
    }

    /// First field that differs from `reference`, in validation order
    fn first_mismatch(&self, reference: &Self) -> Option<CredentialField> {
        self.fields()
            .into_iter()
            .zip(reference.fields())
            .find(|((_, presented), (_, expected))| presented != expected)
            .map(|((field, _), _)| field)
    }
}

// Keeps the password out of logs and panic messages
impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection details reported while Running (no password)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    pub host: String,
    pub port: String,
    pub username: String,
}

/// Result of a successful connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
}

/// Result of a close (always successful)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
}

/// Why a connect was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Invalid {0}")]
    InvalidCredential(CredentialField),
}

/// Proof that the gate was Running when a data operation started
///
/// Holding it blocks transitions until it is dropped. Never hold one across
/// an `.await`.
pub struct GateGuard<'a> {
    _status: RwLockReadGuard<'a, ServiceStatus>,
}

/// The Stopped/Running state machine
pub struct Gate {
    reference: ConnectionCredentials,
    status: RwLock<ServiceStatus>,
}

impl Gate {
    /// A gate in the Stopped state that accepts `reference` on connect
    pub fn new(reference: ConnectionCredentials) -> Self {
        Self {
            reference,
            status: RwLock::new(ServiceStatus::Stopped),
        }
    }

    /// Current status
    pub fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    /// Validate `presented` and move to Running
    ///
    /// Already Running: succeeds immediately without comparing anything.
    /// Otherwise host, port, username and password are compared in that
    /// order; the first mismatch leaves the gate Stopped and is reported.
    pub fn connect(&self, presented: &ConnectionCredentials) -> Result<ConnectOutcome, GateError> {
        let mut status = self.status.write();
        if *status == ServiceStatus::Running {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        if let Some(field) = presented.first_mismatch(&self.reference) {
            *status = ServiceStatus::Stopped;
            return Err(GateError::InvalidCredential(field));
        }

        *status = ServiceStatus::Running;
        Ok(ConnectOutcome::Connected)
    }

    /// Move to Stopped; idempotent
    pub fn close(&self) -> CloseOutcome {
        let mut status = self.status.write();
        match *status {
            ServiceStatus::Stopped => CloseOutcome::AlreadyClosed,
            ServiceStatus::Running => {
                *status = ServiceStatus::Stopped;
                CloseOutcome::Closed
            }
        }
    }

    /// Connection details while Running, `None` while Stopped
    pub fn details(&self) -> Option<ConnectionDetails> {
        match self.status() {
            ServiceStatus::Stopped => None,
            ServiceStatus::Running => Some(ConnectionDetails {
                host: self.reference.host.clone(),
                port: self.reference.port.clone(),
                username: self.reference.username.clone(),
            }),
        }
    }

    /// Admit a data operation; `None` while Stopped
    pub fn enter(&self) -> Option<GateGuard<'_>> {
        let status = self.status.read();
        match *status {
            ServiceStatus::Running => Some(GateGuard { _status: status }),
            ServiceStatus::Stopped => None,
        }
    }
}
