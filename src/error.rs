//! Error types for the chat relay
//!
//! Defines application-level errors, admission rejections, and
//! per-peer send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// None of these escape a session: `handle_connection` converts them into a
/// close action, and the listener only logs what is returned.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Client did not finish the WebSocket handshake in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Username rejected at admission
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Relay actor is gone (internal channel broken)
    #[error("Relay unavailable")]
    ChannelSend,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Shutdown did not complete cleanly
    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

/// Admission rejections
///
/// The display text is sent to the rejected connection as the close reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("Please provide username")]
    MissingUsername,

    #[error("Please provide valid username.")]
    InvalidUsername,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Server is shutting down")]
    ShuttingDown,
}

/// Message send errors
///
/// Occurs when pushing an event to a client's outbound queue fails.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}
