//! Server bootstrap with graceful shutdown.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::info;

use keywatch_core::ports::outbound::Storage;

use crate::router::router;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind unsubscribe service to port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    #[error("unsubscribe service failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Runs the unsubscribe service on `port` until the shutdown signal fires.
///
/// In-flight requests drain before the future resolves.
pub async fn serve<S: Storage + 'static>(
    store: Arc<Mutex<S>>,
    port: u16,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), GatewayError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { port, source })?;

    info!(%addr, "unsubscribe service listening");
    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
            info!("unsubscribe service shutting down");
        })
        .await?;

    Ok(())
}
