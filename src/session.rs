//! WebSocket connection session
//!
//! One task per connection: handshake on `/chat/{username}`, admission
//! through the relay, the active message loop, and teardown.
//! A session moves `Admitting → Active → Closing → Closed` exactly once.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use percent_encoding::percent_decode_str;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::client::{connection, ConnectionInbox};
use crate::error::AppError;
use crate::inactivity::InactivityMonitor;
use crate::sanitize::sanitize;
use crate::server::RelayHandle;
use crate::types::{departure_message, ClientId, CloseReason};

/// Route prefix; the rest of the path is the requested username
const CHAT_PATH_PREFIX: &str = "/chat/";

/// Per-client outbound queue size
const OUTBOUND_BUFFER_SIZE: usize = 32;

/// Upper bound on completing the WebSocket upgrade
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on writing one event frame; a peer that stalls longer is dead
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on each teardown step (writer stop, close frame)
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsSender = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsReceiver = SplitStream<WebSocketStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Admitting,
    Active,
    Closing,
    Closed,
}

/// How the active phase ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    /// Peer sent a close frame with this code, or dropped (`None`)
    Peer(Option<u16>),
    /// The relay closed the connection
    Server(CloseReason),
}

impl Ending {
    /// Close code that ended the session, if any
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Ending::Peer(code) => *code,
            Ending::Server(reason) => Some(reason.code()),
        }
    }

    /// Reason text broadcast to the remaining clients
    pub fn departure_message(&self) -> &'static str {
        departure_message(self.close_code())
    }
}

/// Lifecycle of one client connection
#[derive(Debug)]
pub struct Session {
    pub id: ClientId,
    pub username: String,
    state: SessionState,
}

impl Session {
    pub fn new(username: String) -> Self {
        Self {
            id: ClientId::new(),
            username,
            state: SessionState::Admitting,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Admitting → Active
    pub fn activate(&mut self) -> bool {
        if self.state != SessionState::Admitting {
            return false;
        }
        self.state = SessionState::Active;
        true
    }

    /// Admitting/Active → Closing
    ///
    /// Returns false if teardown already started; later close signals are ignored.
    pub fn begin_close(&mut self) -> bool {
        match self.state {
            SessionState::Admitting | SessionState::Active => {
                self.state = SessionState::Closing;
                true
            }
            SessionState::Closing | SessionState::Closed => false,
        }
    }

    /// Closing → Closed
    pub fn finish(&mut self) {
        self.state = SessionState::Closed;
    }
}

/// Extract the requested username from a request path
///
/// Returns `None` for paths outside the chat route. `/chat/` yields an
/// empty name, which admission rejects. The segment is percent-decoded;
/// invalid UTF-8 is kept as sent and fails the name grammar later.
pub fn username_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(CHAT_PATH_PREFIX)?;
    if rest.contains('/') {
        return None;
    }
    let username = percent_decode_str(rest)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| rest.to_string());
    Some(username)
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, admits the client, and runs it until
/// it closes. Every per-connection failure becomes a close action here.
/// A handshake still pending when `shutdown` flips is abandoned.
pub async fn handle_connection(
    stream: TcpStream,
    relay: RelayHandle,
    inactivity_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    let mut requested = None;
    let callback = |request: &Request, response: Response| {
        match username_from_path(request.uri().path()) {
            Some(username) => {
                requested = Some(username);
                Ok(response)
            }
            None => {
                let mut rejection: ErrorResponse = ErrorResponse::new(Some("Not found".to_string()));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        }
    };

    // WebSocket handshake
    let ws_stream = tokio::select! {
        accepted = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_hdr_async(stream, callback)) => {
            accepted.map_err(|_| AppError::HandshakeTimeout)??
        }
        _ = async { let _ = shutdown.wait_for(|stopping| *stopping).await; } => {
            debug!("Dropping {} mid-handshake for shutdown", peer_addr);
            return Ok(());
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let mut session = Session::new(requested.unwrap_or_default());
    info!(user = %session.username, client_id = %session.id, %peer_addr, "Admitting");

    // Held for the whole session so the event queue only ends when we stop it
    let (handle, inbox) = connection(OUTBOUND_BUFFER_SIZE);

    if let Err(e) = relay
        .join(session.id, session.username.clone(), handle.clone())
        .await
    {
        warn!(user = %session.username, %peer_addr, "Admission rejected: {}", e);
        session.begin_close();
        send_close(&mut ws_sender, &CloseReason::Error(e.to_string())).await;
        session.finish();
        return Ok(());
    }
    session.activate();

    let ConnectionInbox { events, mut close } = inbox;
    let (stop_tx, stop_rx) = oneshot::channel();
    let (alive_tx, mut writer_gone) = oneshot::channel::<()>();
    let mut writer = tokio::spawn(write_events(ws_sender, events, stop_rx, alive_tx));

    let mut monitor = InactivityMonitor::new(inactivity_timeout);
    monitor.arm();

    let ending = run_active(
        &session,
        &relay,
        &mut monitor,
        &mut ws_receiver,
        &mut close,
        &mut writer_gone,
    )
    .await;

    if !session.begin_close() {
        return Ok(());
    }
    monitor.cancel();

    let reason = ending.departure_message();
    if let Err(e) = relay.leave(session.id, &session.username, reason).await {
        warn!(user = %session.username, "Failed to deregister: {}", e);
    }

    let _ = stop_tx.send(());
    let ws_sender = match timeout(CLOSE_TIMEOUT, &mut writer).await {
        Ok(Ok(sink)) => sink,
        Ok(Err(e)) => {
            error!("Writer task for {} failed: {}", session.username, e);
            None
        }
        Err(_) => {
            debug!("Writer for {} stuck, aborting", session.username);
            writer.abort();
            None
        }
    };
    drop(handle);

    if let Some(mut ws_sender) = ws_sender {
        match &ending {
            Ending::Server(close_reason) => send_close(&mut ws_sender, close_reason).await,
            Ending::Peer(_) => {
                let _ = timeout(CLOSE_TIMEOUT, ws_sender.close()).await;
            }
        }
    }
    session.finish();

    info!(user = %session.username, client_id = %session.id, reason = %reason, "Client disconnected");

    Ok(())
}

/// Active state: relay inbound text until a close signal
///
/// Close signals are a server close request, inactivity expiry, the writer
/// giving up on the socket, or the peer closing.
async fn run_active(
    session: &Session,
    relay: &RelayHandle,
    monitor: &mut InactivityMonitor,
    ws_receiver: &mut WsReceiver,
    close: &mut mpsc::UnboundedReceiver<CloseReason>,
    writer_gone: &mut oneshot::Receiver<()>,
) -> Ending {
    loop {
        tokio::select! {
            biased;
            Some(reason) = close.recv() => {
                debug!("Closing {}: {}", session.username, reason);
                return Ending::Server(reason);
            }
            _ = monitor.expired() => return Ending::Server(CloseReason::Inactivity),
            _ = &mut *writer_gone => {
                debug!("Writer for {} stopped", session.username);
                return Ending::Peer(None);
            }
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let text = sanitize(&text);
                    monitor.arm();
                    if let Err(e) = relay.message(session.id, &session.username, text).await {
                        error!(user = %session.username, "Failed to relay message: {}", e);
                        return Ending::Server(CloseReason::Error(e.to_string()));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Client {} sent close frame", session.username);
                    return Ending::Peer(frame.map(|f| u16::from(f.code)));
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!("Ignoring binary frame from {}", session.username);
                }
                Some(Ok(_)) => {
                    // Ping/Pong are answered by tungstenite
                }
                Some(Err(e)) => {
                    warn!(user = %session.username, "WebSocket error: {}", e);
                    return Ending::Peer(None);
                }
                None => return Ending::Peer(None),
            },
        }
    }
}

/// Writer task: drain queued events onto the socket until told to stop
///
/// Hands the sink back for the close frame, or `None` once a write failed
/// or stalled. `alive` is dropped on exit so the session notices.
async fn write_events(
    mut ws_sender: WsSender,
    mut events: mpsc::Receiver<Arc<str>>,
    mut stop: oneshot::Receiver<()>,
    alive: oneshot::Sender<()>,
) -> Option<WsSender> {
    loop {
        let payload = tokio::select! {
            biased;
            _ = &mut stop => break,
            payload = events.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };
        match timeout(WRITE_TIMEOUT, ws_sender.send(Message::Text(payload.to_string()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("WebSocket write failed: {}", e);
                return None;
            }
            Err(_) => {
                debug!("WebSocket write stalled for {:?}", WRITE_TIMEOUT);
                return None;
            }
        }
    }
    drop(alive);
    Some(ws_sender)
}

/// Send a close frame carrying the reason's code and text
async fn send_close(ws_sender: &mut WsSender, reason: &CloseReason) {
    let frame = CloseFrame {
        code: CloseCode::from(reason.code()),
        reason: reason.text().to_string().into(),
    };
    match timeout(CLOSE_TIMEOUT, ws_sender.send(Message::Close(Some(frame)))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Failed to send close frame: {}", e),
        Err(_) => debug!("Timed out sending close frame"),
    }
}
