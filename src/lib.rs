//! Single-room WebSocket Chat Relay Library
//!
//! Clients connect to `/chat/{username}`; every accepted text message is
//! sanitized and broadcast to all connected clients.
//!
//! # Features
//! - Username validation (grammar + uniqueness) at admission
//! - Join/leave announcements
//! - Markup stripping on inbound text
//! - Inactivity eviction
//! - Graceful shutdown with a dedicated close code
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RelayServer` is the central actor owning the client registry
//! - Each connection runs a `session` task communicating with the relay
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_relay::{serve, Config, RelayServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let listener = TcpListener::bind(config.bind_addr()).await.unwrap();
//!     let relay = RelayServer::spawn(config.echo);
//!
//!     serve(listener, relay, config.inactivity_timeout, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod inactivity;
pub mod listener;
pub mod message;
pub mod registry;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod types;
pub mod validate;

// Re-export main types for convenience
pub use client::{connection, Client, ConnectionHandle, ConnectionInbox};
pub use config::{Config, EchoPolicy};
pub use error::{AdmissionError, AppError, SendError};
pub use listener::serve;
pub use message::{Event, EventKind};
pub use registry::Registry;
pub use server::{RelayHandle, RelayServer, ServerCommand};
pub use session::handle_connection;
pub use types::{close_code, ClientId, CloseReason};
