//! Wire event definitions
//!
//! Every pushed message is a flat JSON object:
//! `{"type": <ordinal>, "username": "...", "message": "...", "timestamp": <epoch ms>}`.
//! Inbound messages have no envelope; the raw text frame is the chat text.

use serde::{Serialize, Serializer};

/// Event kind, serialized as its ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// Admission succeeded (sent to the new client only)
    Ready = 0,
    /// Chat message
    Message = 1,
    /// A client left
    Disconnected = 2,
    /// A client joined (sent to everyone else)
    Connected = 3,
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Server → Client event
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl Event {
    fn new(kind: EventKind, username: &str, message: Option<String>) -> Self {
        Self {
            kind,
            username: username.to_string(),
            message,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn ready(username: &str) -> Self {
        Self::new(EventKind::Ready, username, None)
    }

    pub fn connected(username: &str) -> Self {
        Self::new(EventKind::Connected, username, None)
    }

    pub fn message(username: &str, text: String) -> Self {
        Self::new(EventKind::Message, username, Some(text))
    }

    pub fn disconnected(username: &str, reason: &str) -> Self {
        Self::new(EventKind::Disconnected, username, Some(reason.to_string()))
    }

    /// Serialize to the text frame payload
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
