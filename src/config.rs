//! Configuration for kvgate
//!
//! Centralized configuration with sensible defaults. Loaded once at startup
//! from a JSON document and never mutated afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{KvError, Result};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Config file used when neither a CLI path nor `CONFIG_PATH` is given
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Main configuration for a kvgate instance
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
    pub gate: GateConfig,
}

// -----------------------------------------------------------------------------
// Server
// -----------------------------------------------------------------------------

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host; also the host a client must present to connect
    pub host: String,

    /// Bind port, kept as text because clients submit it as text
    pub port: String,

    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: "8080".to_string(),
            shutdown_grace_secs: 5,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for the listener
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// -----------------------------------------------------------------------------
// Storage
// -----------------------------------------------------------------------------

/// Which embedded engine backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Write-ahead-log engine persisted under `path`
    Wal,

    /// Volatile in-memory engine
    Memory,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Embedded storage engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,

    /// Data directory for the WAL engine
    pub path: PathBuf,

    /// WAL write buffer size in KiB
    #[serde(alias = "cacheSize")]
    pub cache_size: usize,

    pub sync: WalSyncStrategy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::Wal,
            path: PathBuf::from("./data"),
            cache_size: 1024,
            sync: WalSyncStrategy::EveryWrite,
        }
    }
}

// -----------------------------------------------------------------------------
// Logging
// -----------------------------------------------------------------------------

/// Output encoding of the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level directive, overridden by `RUST_LOG`
    pub level: String,

    pub format: LogFormat,

    /// Directory holding one `{YYYY-MM-DD}.log` file per day
    pub path: PathBuf,

    /// Also log to the console in a human-readable form
    #[serde(alias = "isDevelopment")]
    pub development: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            path: PathBuf::from("./logs"),
            development: false,
        }
    }
}

// -----------------------------------------------------------------------------
// Gate
// -----------------------------------------------------------------------------

/// Reference credentials a connect request must match
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub username: String,
    pub password: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from the first source that applies:
    /// 1. `explicit` path
    /// 2. `CONFIG_PATH` environment variable
    /// 3. `config.json` in the working directory
    ///
    /// A missing file yields the defaults. Nothing is created on disk; call
    /// [`Config::prepare_dirs`] once any overrides have been applied.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse a config file, filling unspecified fields with defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
            .map_err(|e| KvError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a JSON document
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| KvError::Config(e.to_string()))
    }

    /// Ensure the storage and log directories exist
    pub fn prepare_dirs(&self) -> Result<()> {
        if self.storage.kind == StorageKind::Wal {
            fs::create_dir_all(&self.storage.path)?;
        }
        fs::create_dir_all(&self.log.path)?;
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the bind host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    /// Set the bind port
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.config.server.port = port.into();
        self
    }

    /// Set the shutdown grace period (in seconds)
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.server.shutdown_grace_secs = secs;
        self
    }

    /// Select the storage engine
    pub fn storage_kind(mut self, kind: StorageKind) -> Self {
        self.config.storage.kind = kind;
        self
    }

    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage.path = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.storage.sync = strategy;
        self
    }

    /// Set the WAL write buffer size (in KiB)
    pub fn cache_size(mut self, kib: usize) -> Self {
        self.config.storage.cache_size = kib;
        self
    }

    /// Set the reference credentials for the gate
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.gate.username = username.into();
        self.config.gate.password = password.into();
        self
    }

    /// Set the log directory
    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log.path = path.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
