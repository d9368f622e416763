//! # kvgate
//!
//! A key-value store exposed over HTTP, with:
//! - A connection gate (Stopped/Running) guarding every data operation
//! - A request pipeline: correlation IDs, structured logging, panic
//!   recovery, CORS
//! - A lock-guarded storage adapter over an embedded engine
//! - A write-ahead-log engine with crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │        request id → logging → recovery → CORS                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    API Handlers                              │
//! │              (gate check before storage)                     │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │      Gate       │                │     KvStore     │
//!   │ Stopped/Running │                │    (RwLock)     │
//!   └─────────────────┘                └────────┬────────┘
//!                                               │
//!                                               ▼
//!                                      ┌─────────────────┐
//!                                      │ StorageEngine   │
//!                                      │ (WAL | memory)  │
//!                                      └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod telemetry;

pub mod wal;
pub mod engine;
pub mod storage;
pub mod gate;
pub mod api;
pub mod server;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result, StoreError, StoreResult};
pub use config::Config;
pub use engine::StorageEngine;
pub use gate::{Gate, ServiceStatus};
pub use server::Server;
pub use storage::KvStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvgate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
