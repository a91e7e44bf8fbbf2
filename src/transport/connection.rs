//! Relay-side connection handler.
//!
//! One [`ClientConnection`] serves one browser socket. Frames are handled
//! in arrival order and every reply goes back on the same socket.
//!
//! # Event Loop
//!
//! - Sends the connection hello on accept
//! - Parses each text frame once and answers it
//! - Stops on close, stream error, or relay shutdown
//! - Releases the owned session when it stops

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ClientId, SessionId};
use crate::protocol::message::PROCESSING_FAILED;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::SessionStore;

// ============================================================================
// Constants
// ============================================================================

/// Characters of a URI included in log lines.
const LOGGED_URI_PREFIX: usize = 20;

// ============================================================================
// ClientConnection
// ============================================================================

/// State of one relay connection.
///
/// Owns at most one pairing session. Registering again replaces it, and
/// dropping the connection releases it.
pub(crate) struct ClientConnection {
    client_id: ClientId,
    config: Arc<BridgeConfig>,
    store: Arc<SessionStore>,
    session: Option<SessionId>,
}

impl ClientConnection {
    /// Creates the handler for a freshly accepted socket.
    pub(crate) fn new(
        client_id: ClientId,
        config: Arc<BridgeConfig>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            client_id,
            config,
            store,
            session: None,
        }
    }

    /// Returns the session this connection currently owns.
    #[inline]
    #[must_use]
    pub(crate) fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    /// Runs the event loop until the socket closes or `shutdown` fires.
    pub(crate) async fn run(
        mut self,
        ws_stream: WebSocketStream<TcpStream>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        if let Err(e) = ws_write
            .send(Message::Text(ServerMessage::Connected.to_json().into()))
            .await
        {
            warn!(client_id = %self.client_id, error = %e, "Failed to send hello");
            return;
        }

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    let reply = match message {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),

                        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                            Ok(text) => self.handle_text(text),
                            Err(_) => ServerMessage::error(PROCESSING_FAILED),
                        },

                        Some(Ok(Message::Close(_))) => {
                            debug!(client_id = %self.client_id, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            debug!(client_id = %self.client_id, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(client_id = %self.client_id, "WebSocket stream ended");
                            break;
                        }

                        // Ping, Pong, raw frames
                        Some(Ok(_)) => continue,
                    };

                    if let Err(e) = ws_write.send(Message::Text(reply.to_json().into())).await {
                        warn!(client_id = %self.client_id, error = %e, "Failed to send reply");
                        break;
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }

        self.close();
        trace!(client_id = %self.client_id, "Connection loop terminated");
    }

    /// Handles one text frame and returns the reply for this socket.
    pub(crate) fn handle_text(&mut self, text: &str) -> ServerMessage {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(Error::InvalidUri { message }) => return ServerMessage::error(message),
            Err(e) => {
                debug!(client_id = %self.client_id, error = %e, "Unparseable frame");
                return ServerMessage::error(PROCESSING_FAILED);
            }
        };

        match message {
            ClientMessage::Connect => ServerMessage::Connected,
            ClientMessage::RegisterUri { uri } => match self.register(&uri) {
                Ok(reply) => reply,
                Err(e) => ServerMessage::error(e.peer_message()),
            },
            ClientMessage::Generic(_) => ServerMessage::ack(),
        }
    }

    /// Stores `uri` as this connection's session, replacing any previous one.
    fn register(&mut self, uri: &str) -> Result<ServerMessage> {
        self.config.validate_uri(uri)?;

        if let Some(previous) = self.session.take() {
            self.store.release(&previous);
        }

        let session = self.store.create(uri);
        let redirect_url = self.config.redirect_url(uri);

        debug!(
            client_id = %self.client_id,
            session_id = %session.id(),
            uri = %truncate(uri, LOGGED_URI_PREFIX),
            "URI registered over socket"
        );

        self.session = Some(session.id().clone());

        Ok(ServerMessage::Registered {
            session_id: session.id().to_string(),
            redirect_url,
        })
    }

    /// Releases the owned session. Safe to call more than once.
    pub(crate) fn close(&mut self) {
        if let Some(session_id) = self.session.take() {
            self.store.release(&session_id);
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Returns at most `max` characters of `text`.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (ClientConnection, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::default());
        let conn = ClientConnection::new(
            ClientId::next(),
            Arc::new(BridgeConfig::default()),
            Arc::clone(&store),
        );
        (conn, store)
    }

    fn register_frame(uri: &str) -> String {
        ClientMessage::register_uri(uri).to_json()
    }

    #[test]
    fn test_register_creates_session() {
        let (mut conn, store) = connection();

        let reply = conn.handle_text(&register_frame("wc:abc@2?relay=x"));
        let ServerMessage::Registered {
            session_id,
            redirect_url,
        } = reply
        else {
            panic!("expected Registered, got {reply:?}");
        };

        assert_eq!(store.get(&session_id).unwrap().uri(), "wc:abc@2?relay=x");
        assert_eq!(conn.session().map(SessionId::as_str), Some(session_id.as_str()));
        assert!(redirect_url.starts_with("/qr-view.html?uri=wc%3Aabc%402"));
    }

    #[test]
    fn test_reregister_releases_previous() {
        let (mut conn, store) = connection();

        conn.handle_text(&register_frame("wc:first@2"));
        let first = conn.session().cloned().unwrap();
        conn.handle_text(&register_frame("wc:second@2"));
        let second = conn.session().cloned().unwrap();

        assert_ne!(first, second);
        assert!(store.get(first.as_str()).is_err());
        assert_eq!(store.get(second.as_str()).unwrap().uri(), "wc:second@2");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_register_rejects_bad_scheme() {
        let (mut conn, store) = connection();

        let reply = conn.handle_text(&register_frame("http://example.com"));
        assert!(matches!(reply, ServerMessage::Error { .. }));
        assert!(store.is_empty());
        assert!(conn.session().is_none());
    }

    #[test]
    fn test_register_without_uri_field() {
        let (mut conn, _) = connection();
        let reply = conn.handle_text(r#"{"type":"walletconnect","action":"register_uri"}"#);
        assert_eq!(reply, ServerMessage::error("URI is required"));
    }

    #[test]
    fn test_empty_and_missing_uri_report_same_text() {
        let (mut conn, store) = connection();

        let empty = conn.handle_text(&register_frame(""));
        let missing = conn.handle_text(r#"{"type":"walletconnect","action":"register_uri"}"#);
        assert_eq!(empty, ServerMessage::error("URI is required"));
        assert_eq!(empty, missing);
        assert!(store.is_empty());
    }

    #[test]
    fn test_connect_frame_repeats_hello() {
        let (mut conn, _) = connection();
        let reply = conn.handle_text(r#"{"type":"walletconnect","action":"connect"}"#);
        assert_eq!(reply, ServerMessage::Connected);
    }

    #[test]
    fn test_generic_frame_acknowledged() {
        let (mut conn, store) = connection();
        assert_eq!(conn.handle_text(r#"{"ping":1}"#), ServerMessage::ack());
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_frame() {
        let (mut conn, _) = connection();
        assert_eq!(
            conn.handle_text("not json at all"),
            ServerMessage::error(PROCESSING_FAILED)
        );
    }

    #[test]
    fn test_drop_releases_session() {
        let (mut conn, store) = connection();
        conn.handle_text(&register_frame("wc:drop@2"));
        assert_eq!(store.len(), 1);

        drop(conn);
        assert!(store.is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("wc:abcdef", 3), "wc:");
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("ééé", 2), "éé");
    }
}
