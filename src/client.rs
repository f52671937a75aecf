//! Client struct definition
//!
//! Represents an admitted client: its name and the handle used to push
//! events to its connection and to close it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::types::{ClientId, CloseReason};

/// Push side of one connection
///
/// Events go through a bounded queue and may be dropped when the client
/// falls behind. Close requests use their own unbounded channel so a
/// full event queue can never swallow them.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    events: mpsc::Sender<Arc<str>>,
    close: mpsc::UnboundedSender<CloseReason>,
}

/// Receive side of one connection, owned by its session
#[derive(Debug)]
pub struct ConnectionInbox {
    pub events: mpsc::Receiver<Arc<str>>,
    pub close: mpsc::UnboundedReceiver<CloseReason>,
}

/// Create a connection channel pair with the given event queue capacity
pub fn connection(capacity: usize) -> (ConnectionHandle, ConnectionInbox) {
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (close_tx, close_rx) = mpsc::unbounded_channel();
    (
        ConnectionHandle {
            events: events_tx,
            close: close_tx,
        },
        ConnectionInbox {
            events: events_rx,
            close: close_rx,
        },
    )
}

/// Registered client
///
/// Cloning is cheap: the handle only holds channel senders.
#[derive(Debug, Clone)]
pub struct Client {
    /// Identifier of the owning session
    pub id: ClientId,
    /// Username (unique within the registry, never changes)
    pub username: String,
    /// Relay → Session channels
    pub handle: ConnectionHandle,
}

impl Client {
    /// Create a new client with the given ID, name, and connection handle
    pub fn new(id: ClientId, username: String, handle: ConnectionHandle) -> Self {
        Self {
            id,
            username,
            handle,
        }
    }

    /// Push a serialized event without waiting
    ///
    /// Returns an error if the session has ended or its queue is full.
    pub fn send(&self, payload: Arc<str>) -> Result<(), SendError> {
        self.handle.events.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Ask the session to close its connection
    ///
    /// Only fails once the session has ended.
    pub fn close(&self, reason: CloseReason) -> Result<(), SendError> {
        self.handle
            .close
            .send(reason)
            .map_err(|_| SendError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(capacity: usize) -> (Client, ConnectionInbox) {
        let (handle, inbox) = connection(capacity);
        (Client::new(ClientId::new(), "Alice".to_string(), handle), inbox)
    }

    #[tokio::test]
    async fn test_client_send() {
        let (client, mut inbox) = client(32);

        client.send("{}".into()).unwrap();

        assert_eq!(&*inbox.events.recv().await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_client_send_closed() {
        let (client, inbox) = client(32);
        drop(inbox);

        assert!(matches!(client.send("{}".into()), Err(SendError::ChannelClosed)));
        assert!(matches!(
            client.close(CloseReason::Shutdown),
            Err(SendError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_client_send_full() {
        let (client, _inbox) = client(1);

        client.send("a".into()).unwrap();
        assert!(matches!(client.send("b".into()), Err(SendError::ChannelFull)));
    }

    #[tokio::test]
    async fn test_close_not_blocked_by_full_queue() {
        let (client, mut inbox) = client(1);
        client.send("a".into()).unwrap();
        assert!(client.send("b".into()).is_err());

        client.close(CloseReason::Shutdown).unwrap();
        assert_eq!(inbox.close.try_recv().unwrap(), CloseReason::Shutdown);
    }
}
