//! Basic type definitions for the chat relay
//!
//! Provides:
//! - `ClientId`: UUID-based unique connection identifier
//! - `close_code`: application close codes sent to departing clients
//! - `CloseReason`: why a session ended, plus departure text for peers

use std::fmt;

use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Usernames can be reused after a client leaves,
/// so the id is what ties a registry entry to the session that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// WebSocket close codes in the application range (4000-4999)
pub mod close_code {
    /// Client left the chat on its own
    pub const CLIENT_LEFT: u16 = 4000;
    /// Admission rejected or session failed
    pub const ERROR: u16 = 4001;
    /// No inbound activity within the configured timeout
    pub const INACTIVITY: u16 = 4002;
    /// Relay is shutting down
    pub const SHUTDOWN: u16 = 4003;
}

/// Close text for inactivity eviction, also broadcast as the departure reason
pub const INACTIVITY_MESSAGE: &str = "Disconnected due to inactivity";

/// Close text sent to every client on shutdown
pub const SHUTDOWN_MESSAGE: &str = "Server is shutting down";

const LEFT_MESSAGE: &str = "Left the chat";
const GENERIC_MESSAGE: &str = "Disconnected";

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client-initiated departure
    ClientLeft,
    /// Admission rejection or runtime failure, with the message shown to the client
    Error(String),
    /// Inactivity timer fired
    Inactivity,
    /// Server-initiated shutdown
    Shutdown,
}

impl CloseReason {
    /// Numeric close code sent to the departing client
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::ClientLeft => close_code::CLIENT_LEFT,
            CloseReason::Error(_) => close_code::ERROR,
            CloseReason::Inactivity => close_code::INACTIVITY,
            CloseReason::Shutdown => close_code::SHUTDOWN,
        }
    }

    /// Human-readable text sent alongside the close code
    pub fn text(&self) -> &str {
        match self {
            CloseReason::ClientLeft => LEFT_MESSAGE,
            CloseReason::Error(message) => message,
            CloseReason::Inactivity => INACTIVITY_MESSAGE,
            CloseReason::Shutdown => SHUTDOWN_MESSAGE,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text(), self.code())
    }
}

/// Classify a close code into the departure reason broadcast to peers
///
/// `None` means the connection dropped without a close frame.
pub fn departure_message(code: Option<u16>) -> &'static str {
    match code {
        Some(close_code::INACTIVITY) => INACTIVITY_MESSAGE,
        Some(close_code::CLIENT_LEFT) => LEFT_MESSAGE,
        _ => GENERIC_MESSAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_close_reason_codes() {
        assert_eq!(CloseReason::ClientLeft.code(), 4000);
        assert_eq!(CloseReason::Error("x".into()).code(), 4001);
        assert_eq!(CloseReason::Inactivity.code(), 4002);
        assert_eq!(CloseReason::Shutdown.code(), 4003);
    }

    #[test]
    fn test_error_reason_carries_message() {
        let reason = CloseReason::Error("Username already taken".to_string());
        assert_eq!(reason.text(), "Username already taken");
    }

    #[test]
    fn test_departure_classification() {
        assert_eq!(
            departure_message(Some(close_code::INACTIVITY)),
            "Disconnected due to inactivity"
        );
        assert_eq!(departure_message(Some(close_code::CLIENT_LEFT)), "Left the chat");
        assert_eq!(departure_message(Some(1001)), "Disconnected");
        assert_eq!(departure_message(Some(close_code::SHUTDOWN)), "Disconnected");
        assert_eq!(departure_message(None), "Disconnected");
    }
}
