//! Accept loop and graceful shutdown

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::server::RelayHandle;
use crate::session::handle_connection;

/// How long sessions get to flush their close frames on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accept connections until `shutdown` resolves, then close every session
///
/// Returns an error if the relay could not be told to shut down or sessions
/// did not finish within the grace period.
pub async fn serve<F>(
    listener: TcpListener,
    relay: RelayHandle,
    inactivity_timeout: Duration,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()>,
{
    let mut sessions = JoinSet::new();
    let (stopping, _) = watch::channel(false);
    tokio::pin!(shutdown);

    // Connection accept loop
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let relay = relay.clone();
                    let stopping = stopping.subscribe();

                    // Spawn handler task for each connection
                    sessions.spawn(async move {
                        if let Err(e) = handle_connection(stream, relay, inactivity_timeout, stopping).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = finished {
                    error!("Session task failed: {}", e);
                }
            }
        }
    }

    drop(listener);
    info!("Server shutdown: listener closed");

    // Releases connections that never finished their handshake
    stopping.send_replace(true);

    let notified = relay
        .shutdown()
        .await
        .map_err(|e| AppError::Shutdown(e.to_string()))?;
    info!("Notified {} connected clients", notified);

    let drained = timeout(SHUTDOWN_GRACE, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!("{} sessions still open after grace period", sessions.len());
        sessions.abort_all();
        return Err(AppError::Shutdown(
            "sessions did not close within the grace period".to_string(),
        ));
    }

    Ok(())
}
