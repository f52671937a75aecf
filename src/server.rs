//! RelayServer actor implementation
//!
//! The central actor that owns the client registry. Sessions talk to it
//! through `RelayHandle`; commands are processed one at a time, which makes
//! admission (check + insert) and teardown (remove + announce) atomic.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::client::{Client, ConnectionHandle};
use crate::config::EchoPolicy;
use crate::error::{AdmissionError, AppError};
use crate::message::Event;
use crate::registry::Registry;
use crate::types::{ClientId, CloseReason};
use crate::validate::validate_username;

/// Channel buffer size for relay commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Commands sent from sessions to the RelayServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Admission request
    Join {
        client_id: ClientId,
        username: String,
        handle: ConnectionHandle,
        reply: oneshot::Sender<Result<(), AdmissionError>>,
    },
    /// Sanitized chat text from an active client
    Message {
        client_id: ClientId,
        username: String,
        text: String,
    },
    /// Session closed
    Leave {
        client_id: ClientId,
        username: String,
        reason: String,
    },
    /// Registry lookup
    Find {
        username: String,
        reply: oneshot::Sender<bool>,
    },
    /// Registered usernames in admission order
    Members {
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Close every client and clear the registry
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

/// The relay actor
pub struct RelayServer {
    registry: Registry,
    echo: EchoPolicy,
    shutting_down: bool,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl RelayServer {
    /// Create a new RelayServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, echo: EchoPolicy) -> Self {
        Self {
            registry: Registry::new(),
            echo,
            shutting_down: false,
            receiver,
        }
    }

    /// Start the actor on the current runtime and return its handle
    pub fn spawn(echo: EchoPolicy) -> RelayHandle {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        tokio::spawn(Self::new(rx, echo).run());
        RelayHandle { tx }
    }

    /// Run the event loop until all handles are dropped
    pub async fn run(mut self) {
        info!("RelayServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("RelayServer stopped");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Join {
                client_id,
                username,
                handle,
                reply,
            } => {
                let result = self.handle_join(client_id, username, handle);
                let _ = reply.send(result);
            }
            ServerCommand::Message {
                client_id,
                username,
                text,
            } => {
                self.handle_message(client_id, &username, text);
            }
            ServerCommand::Leave {
                client_id,
                username,
                reason,
            } => {
                self.handle_leave(client_id, &username, &reason);
            }
            ServerCommand::Find { username, reply } => {
                let _ = reply.send(self.registry.contains(&username));
            }
            ServerCommand::Members { reply } => {
                let _ = reply.send(self.registry.usernames());
            }
            ServerCommand::Shutdown { reply } => {
                let _ = reply.send(self.handle_shutdown());
            }
        }
    }

    /// Validate, register, announce, and greet a new client
    fn handle_join(
        &mut self,
        client_id: ClientId,
        username: String,
        handle: ConnectionHandle,
    ) -> Result<(), AdmissionError> {
        if self.shutting_down {
            return Err(AdmissionError::ShuttingDown);
        }
        validate_username(&username, &self.registry)?;

        let client = Client::new(client_id, username.clone(), handle);
        let peers = self.registry.snapshot();
        self.registry.add(client.clone());

        info!(user = %username, %client_id, "Client joined");

        let announced = broadcast(&Event::connected(&username), &peers, None);
        let greeted = broadcast(&Event::ready(&username), std::slice::from_ref(&client), None);
        if greeted.failed > 0 {
            warn!(user = %username, "READY could not be delivered");
        }

        debug!(
            delivered = announced.delivered,
            failed = announced.failed,
            "Total clients: {}",
            self.registry.len()
        );
        Ok(())
    }

    /// Fan a chat message out to the room
    fn handle_message(&mut self, client_id: ClientId, username: &str, text: String) {
        if !self.is_registered(client_id, username) {
            debug!(user = %username, "Message from unregistered session dropped");
            return;
        }

        info!(user = %username, text = %text, "Message");

        let exclude = match self.echo {
            EchoPolicy::IncludeSender => None,
            EchoPolicy::ExcludeSender => Some(username),
        };
        let delivery = broadcast(
            &Event::message(username, text),
            &self.registry.snapshot(),
            exclude,
        );
        debug!(
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Message fan-out"
        );
    }

    /// Remove a departed client, then tell everyone left
    fn handle_leave(&mut self, client_id: ClientId, username: &str, reason: &str) {
        if !self.is_registered(client_id, username) {
            return;
        }
        self.registry.remove(username);

        info!(user = %username, %client_id, reason = %reason, "Client left");

        let delivery = broadcast(
            &Event::disconnected(username, reason),
            &self.registry.snapshot(),
            None,
        );

        debug!(
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Total clients: {}",
            self.registry.len()
        );
    }

    /// Ask every session to close, then drop all entries
    fn handle_shutdown(&mut self) -> usize {
        self.shutting_down = true;

        let clients = self.registry.snapshot();
        for client in &clients {
            if let Err(e) = client.close(CloseReason::Shutdown) {
                warn!(user = %client.username, "Failed to notify shutdown: {}", e);
            }
        }
        self.registry.clear();

        info!("Shutdown notified {} clients", clients.len());
        clients.len()
    }

    /// Whether `username` is held by the session `client_id`
    fn is_registered(&self, client_id: ClientId, username: &str) -> bool {
        self.registry
            .find(username)
            .is_some_and(|client| client.id == client_id)
    }
}

/// Cloneable handle to the RelayServer actor
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<ServerCommand>,
}

impl RelayHandle {
    async fn send(&self, cmd: ServerCommand) -> Result<(), AppError> {
        self.tx.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServerCommand,
    ) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| AppError::ChannelSend)
    }

    /// Request admission; on success the client is registered and greeted
    pub async fn join(
        &self,
        client_id: ClientId,
        username: String,
        handle: ConnectionHandle,
    ) -> Result<(), AppError> {
        self.request(|reply| ServerCommand::Join {
            client_id,
            username,
            handle,
            reply,
        })
        .await?
        .map_err(AppError::from)
    }

    /// Broadcast sanitized chat text from an active client
    pub async fn message(
        &self,
        client_id: ClientId,
        username: &str,
        text: String,
    ) -> Result<(), AppError> {
        self.send(ServerCommand::Message {
            client_id,
            username: username.to_string(),
            text,
        })
        .await
    }

    /// Deregister a client and announce its departure
    pub async fn leave(
        &self,
        client_id: ClientId,
        username: &str,
        reason: &str,
    ) -> Result<(), AppError> {
        self.send(ServerCommand::Leave {
            client_id,
            username: username.to_string(),
            reason: reason.to_string(),
        })
        .await
    }

    /// Whether a username is currently registered
    pub async fn find(&self, username: &str) -> Result<bool, AppError> {
        let username = username.to_string();
        self.request(|reply| ServerCommand::Find { username, reply })
            .await
    }

    /// Registered usernames in admission order
    pub async fn members(&self) -> Result<Vec<String>, AppError> {
        self.request(|reply| ServerCommand::Members { reply }).await
    }

    /// Close every client with the shutdown code; returns how many were notified
    pub async fn shutdown(&self) -> Result<usize, AppError> {
        self.request(|reply| ServerCommand::Shutdown { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::{connection, ConnectionInbox};

    fn next_event(inbox: &mut ConnectionInbox) -> serde_json::Value {
        match inbox.events.try_recv() {
            Ok(text) => serde_json::from_str(&text).unwrap(),
            Err(e) => panic!("expected event, got {:?}", e),
        }
    }

    async fn join(relay: &RelayHandle, name: &str) -> (ClientId, ConnectionInbox) {
        let (handle, inbox) = connection(32);
        let id = ClientId::new();
        relay.join(id, name.to_string(), handle).await.unwrap();
        (id, inbox)
    }

    #[tokio::test]
    async fn test_join_announces_and_greets() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let (_, mut alice) = join(&relay, "Alice").await;

        let ready = next_event(&mut alice);
        assert_eq!(ready["type"], 0);
        assert_eq!(ready["username"], "Alice");

        let (_, mut bob) = join(&relay, "Bob1").await;

        let connected = next_event(&mut alice);
        assert_eq!(connected["type"], 3);
        assert_eq!(connected["username"], "Bob1");
        assert!(alice.events.try_recv().is_err());

        let ready = next_event(&mut bob);
        assert_eq!(ready["type"], 0);
        assert_eq!(ready["username"], "Bob1");
        assert!(bob.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_rejections() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let _alice = join(&relay, "Alice").await;

        let cases = [
            ("", AdmissionError::MissingUsername),
            ("a1", AdmissionError::InvalidUsername),
            ("Alice", AdmissionError::UsernameTaken),
        ];
        for (name, expected) in cases {
            let (handle, _inbox) = connection(32);
            match relay.join(ClientId::new(), name.to_string(), handle).await {
                Err(AppError::Admission(e)) => assert_eq!(e, expected),
                other => panic!("{name:?}: unexpected {:?}", other),
            }
        }
        assert_eq!(relay.members().await.unwrap(), vec!["Alice"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_name_admits_one() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let inboxes = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let relay = relay.clone();
            let inboxes = Arc::clone(&inboxes);
            tasks.push(tokio::spawn(async move {
                let (handle, inbox) = connection(32);
                inboxes.lock().await.push(inbox);
                relay.join(ClientId::new(), "Racer".to_string(), handle).await
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => admitted += 1,
                Err(AppError::Admission(AdmissionError::UsernameTaken)) => {}
                Err(e) => panic!("unexpected: {e}"),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(relay.members().await.unwrap(), vec!["Racer"]);
    }

    #[tokio::test]
    async fn test_message_echo_policy() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let (a, mut alice) = join(&relay, "Alice").await;
        let (_, mut bob) = join(&relay, "Bob1").await;
        relay.message(a, "Alice", "hi".to_string()).await.unwrap();
        relay.members().await.unwrap(); // flush

        next_event(&mut alice); // ready
        next_event(&mut alice); // connected Bob1
        next_event(&mut bob); // ready

        for inbox in [&mut alice, &mut bob] {
            let msg = next_event(inbox);
            assert_eq!(msg["type"], 1);
            assert_eq!(msg["username"], "Alice");
            assert_eq!(msg["message"], "hi");
        }

        let relay = RelayServer::spawn(EchoPolicy::ExcludeSender);
        let (a, mut alice) = join(&relay, "Alice").await;
        let (_, mut bob) = join(&relay, "Bob1").await;
        relay.message(a, "Alice", "hi".to_string()).await.unwrap();
        relay.members().await.unwrap();

        next_event(&mut alice); // ready
        next_event(&mut alice); // connected Bob1
        assert!(alice.events.try_recv().is_err());
        next_event(&mut bob); // ready
        assert_eq!(next_event(&mut bob)["message"], "hi");
    }

    #[tokio::test]
    async fn test_leave_removes_before_announcing() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let (a, _alice) = join(&relay, "Alice").await;
        let (_, mut bob) = join(&relay, "Bob1").await;
        next_event(&mut bob); // ready

        relay.leave(a, "Alice", "Left the chat").await.unwrap();
        assert!(!relay.find("Alice").await.unwrap());

        let left = next_event(&mut bob);
        assert_eq!(left["type"], 2);
        assert_eq!(left["username"], "Alice");
        assert_eq!(left["message"], "Left the chat");

        // Second leave is a no-op
        relay.leave(a, "Alice", "Left the chat").await.unwrap();
        relay.members().await.unwrap();
        assert!(bob.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_leave_keeps_new_owner() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let (old, _inbox) = join(&relay, "Alice").await;
        relay.leave(old, "Alice", "Disconnected").await.unwrap();
        let (_new, _inbox2) = join(&relay, "Alice").await;

        relay.leave(old, "Alice", "Disconnected").await.unwrap();
        assert!(relay.find("Alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everyone() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let (_, mut alice) = join(&relay, "Alice").await;
        let (_, mut bob) = join(&relay, "Bob1").await;

        assert_eq!(relay.shutdown().await.unwrap(), 2);
        assert!(relay.members().await.unwrap().is_empty());

        for inbox in [&mut alice, &mut bob] {
            assert_eq!(inbox.close.try_recv().unwrap(), CloseReason::Shutdown);
        }

        let (handle, _inbox) = connection(32);
        assert!(matches!(
            relay.join(ClientId::new(), "Carol".to_string(), handle).await,
            Err(AppError::Admission(AdmissionError::ShuttingDown))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_reaches_client_with_full_queue() {
        let relay = RelayServer::spawn(EchoPolicy::IncludeSender);
        let (handle, mut slow) = connection(4);
        let slow_id = ClientId::new();
        relay.join(slow_id, "Slow".to_string(), handle).await.unwrap();
        let (talker, _inbox) = join(&relay, "Talker").await;

        // Nobody drains Slow's events, so its queue fills up
        for i in 0..16 {
            relay.message(talker, "Talker", format!("msg {i}")).await.unwrap();
        }
        relay.members().await.unwrap();

        relay.shutdown().await.unwrap();
        assert_eq!(slow.close.try_recv().unwrap(), CloseReason::Shutdown);
    }
}
