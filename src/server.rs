//! HTTP Server
//!
//! Binds the listener, serves the API and runs the shutdown sequence:
//!
//! 1. stop accepting new connections when the shutdown signal fires
//! 2. let in-flight requests finish, up to the grace period
//! 3. stop waiting for stragglers
//! 4. sync, then close, the storage adapter

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::error::Result;
use crate::gate::{ConnectionCredentials, Gate};
use crate::storage::KvStore;

/// HTTP server for kvgate
pub struct Server {
    config: Arc<Config>,
    store: Arc<KvStore>,
    gate: Arc<Gate>,
}

impl Server {
    /// Create a new server over an open store; the gate starts Stopped
    pub fn new(config: Arc<Config>, store: Arc<KvStore>) -> Self {
        let gate = Arc::new(Gate::new(ConnectionCredentials::from_config(&config)));
        Self { config, store, gate }
    }

    /// The application router (for testing)
    pub fn router(&self) -> Router {
        api::router(AppState::new(Arc::clone(&self.store), Arc::clone(&self.gate)))
    }

    /// Serve until `shutdown` resolves, then drain and release storage
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.server.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

        self.run_on(listener, shutdown).await
    }

    /// Like [`Server::run`], on an already-bound listener
    pub async fn run_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        let app = self.router();

        let (stopping_tx, mut stopping_rx) = watch::channel(false);
        let signal = async move {
            shutdown.await;
            tracing::info!("shutdown signal received, no longer accepting connections");
            let _ = stopping_tx.send(true);
        };

        let serving = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .into_future();

        let deadline = async move {
            if stopping_rx.wait_for(|stopping| *stopping).await.is_err() {
                // Sender gone without a signal: the server already finished
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = serving => {
                result?;
                tracing::info!("all in-flight requests completed");
            }
            _ = deadline => {
                tracing::warn!(grace_secs = grace.as_secs(), "grace period elapsed, abandoning in-flight requests");
            }
        }

        self.release_storage()
    }

    /// Flush before close: close invalidates the handle a flush would need
    fn release_storage(&self) -> Result<()> {
        tracing::info!("syncing storage");
        if let Err(e) = self.store.sync() {
            tracing::error!(error = %e, "storage sync failed");
        }

        tracing::info!("closing storage");
        self.store.close()?;
        tracing::info!("storage closed");
        Ok(())
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
