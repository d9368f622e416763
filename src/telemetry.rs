//! Logging setup
//!
//! One `tracing` subscriber for the whole process:
//! - file sink in `{log.path}`, rolled daily to `{YYYY-MM-DD}.log` (UTC
//!   date), JSON or text, written off the request path by a background worker
//! - in development mode, an additional human-readable console sink
//!
//! `RUST_LOG` overrides the configured level.

use std::backtrace::Backtrace;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogConfig, LogFormat};
use crate::error::{KvError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// The returned guard flushes buffered records when dropped; keep it alive
/// until the process exits.
pub fn init(config: &LogConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.path)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_suffix("log")
        .build(&config.path)
        .map_err(|e| KvError::Telemetry(format!("cannot open log directory: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer: BoxedLayer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Text => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
    };

    let mut layers = vec![file_layer];
    if config.development {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .boxed(),
        );
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| KvError::Telemetry(format!("invalid log level {:?}: {}", config.level, e)))?;

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| KvError::Telemetry(e.to_string()))?;

    tracing::info!(
        level = %config.level,
        path = %config.path.display(),
        development = config.development,
        "logging initialised"
    );
    Ok(guard)
}

/// Log every panic with its location and a backtrace before unwinding starts
///
/// The request pipeline catches handler panics; this hook is where their
/// stack trace gets recorded.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let backtrace = Backtrace::force_capture();
        tracing::error!(%location, %backtrace, "panic: {}", info);
    }));
}
