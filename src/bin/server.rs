//! kvgate Server Binary
//!
//! Loads configuration, opens storage and serves the HTTP API until Ctrl-C
//! or SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kvgate::server::{shutdown_signal, Server};
use kvgate::{telemetry, Config, KvStore};

/// kvgate Server
#[derive(Parser, Debug)]
#[command(name = "kvgate-server")]
#[command(about = "HTTP key-value service behind a connection gate")]
#[command(version)]
struct Args {
    /// Config file (defaults to $CONFIG_PATH, then ./config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overriding the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Data directory, overriding the config file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.storage.path = dir;
    }

    if let Err(e) = config.prepare_dirs() {
        eprintln!("Failed to create data directories: {}", e);
        return ExitCode::FAILURE;
    }

    // Held until main returns so buffered log records are flushed
    let _log_guard = match telemetry::init(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {}", e);
            return ExitCode::FAILURE;
        }
    };
    telemetry::install_panic_hook();

    tracing::info!(
        version = kvgate::VERSION,
        host = %config.server.host,
        port = %config.server.port,
        storage = ?config.storage.kind,
        env = if config.log.development { "development" } else { "production" },
        "kvgate starting"
    );

    // Return instead of exiting so the log guard is dropped and flushes
    match serve(config).await {
        Ok(()) => {
            tracing::info!("server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "server error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config) -> kvgate::Result<()> {
    let store = Arc::new(KvStore::open(&config.storage)?);

    match store.count() {
        Ok(records) => tracing::info!(records, "storage ready"),
        Err(e) => tracing::warn!(error = %e, "could not count stored records"),
    }

    Server::new(Arc::new(config), store)
        .run(shutdown_signal())
        .await
}
