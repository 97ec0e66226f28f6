//! HTTP server lifecycle for the ingestion API.
//!
//! Bind → spawn the router → return a handle with a shutdown channel.
//! The server runs until the handle is shut down or the process exits.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::api::router::build_router;
use crate::core_state::CoreState;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a running API server.
#[derive(Debug)]
pub struct ApiServer {
    pub local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    /// Signal the server to stop accepting connections.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bind `addr` and serve the ingestion API in a background task.
pub async fn start_server(state: Arc<CoreState>, addr: &str) -> Result<ApiServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|source| {
        ServerError::Bind { addr: addr.to_string(), source }
    })?;
    let local_addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = build_router(state);
    tokio::spawn(async move {
        let serve = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = serve.await {
            tracing::error!(error = %err, "API server exited with error");
        } else {
            tracing::info!("API server stopped");
        }
    });

    tracing::info!(%local_addr, "API server listening");
    Ok(ApiServer { local_addr, shutdown_tx: Some(shutdown_tx) })
}

/// Serve the ingestion API on `addr` until the process exits.
pub async fn run_server(state: Arc<CoreState>, addr: &str) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|source| {
        ServerError::Bind { addr: addr.to_string(), source }
    })?;
    tracing::info!(local_addr = %listener.local_addr()?, "API server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
