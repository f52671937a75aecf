//! WebSocket Chat Relay - Entry Point
//!
//! Loads configuration, starts the RelayServer actor, and accepts
//! connections until Ctrl-C or SIGTERM.

use std::env;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{serve, AppError, Config, RelayServer};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    match run().await {
        Ok(()) => {
            info!("Server shutdown success.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Server shutdown failed with error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;

    // Bind address from command line overrides the environment
    let addr = env::args().nth(1).unwrap_or_else(|| config.bind_addr());

    let listener = TcpListener::bind(&addr).await?;
    info!(
        "Chat relay listening on {} (inactivity timeout {:?})",
        addr, config.inactivity_timeout
    );

    let relay = RelayServer::spawn(config.echo);

    serve(listener, relay, config.inactivity_timeout, shutdown_signal()).await
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}
