//! Persistent-socket relay server.
//!
//! Browsers connect over WebSocket, register pairing URIs, and get their
//! registration pushed back on the same socket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              RelayServer                │
//! │              (single port)              │
//! │  ┌───────────────────────────────────┐  │
//! │  │ ClientId=1 → ClientConnection     │  │
//! │  │ ClientId=2 → ClientConnection     │  │
//! │  └───────────────────────────────────┘  │
//! └──────────────────┬──────────────────────┘
//!                    │ create / release
//!              ┌─────▼──────┐
//!              │SessionStore│
//!              └────────────┘
//! ```
//!
//! Each connection runs in its own task and owns at most one session.
//! Nothing is broadcast between connections.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::session::SessionStore;

use super::connection::ClientConnection;

// ============================================================================
// RelayServer
// ============================================================================

/// WebSocket relay delivering pairing registrations to browser tabs.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(SessionStore::new(config.session_ttl()));
/// let relay = RelayServer::bind(addr, Arc::new(config), store).await?;
/// println!("relay at {}", relay.ws_url());
/// ```
pub struct RelayServer {
    /// Bound address.
    local_addr: SocketAddr,

    /// Shared configuration.
    config: Arc<BridgeConfig>,

    /// Session store shared with the facade.
    store: Arc<SessionStore>,

    /// Live connections by client id.
    connections: RwLock<FxHashMap<ClientId, SocketAddr>>,

    /// Shutdown signal for the accept loop and every connection.
    shutdown_tx: watch::Sender<bool>,
}

// ============================================================================
// RelayServer - Constructor
// ============================================================================

impl RelayServer {
    /// Binds the relay and starts the accept loop.
    ///
    /// Use port 0 to let the OS pick a port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(
        addr: SocketAddr,
        config: Arc<BridgeConfig>,
        store: Arc<SessionStore>,
    ) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Relay socket bound");

        let (shutdown_tx, _) = watch::channel(false);
        let relay = Arc::new(Self {
            local_addr,
            config,
            store,
            connections: RwLock::new(FxHashMap::default()),
            shutdown_tx,
        });

        let relay_clone = Arc::clone(&relay);
        tokio::spawn(async move {
            relay_clone.accept_loop(listener).await;
        });

        info!(%local_addr, "Relay server started");

        Ok(relay)
    }
}

// ============================================================================
// RelayServer - Public API
// ============================================================================

impl RelayServer {
    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL of this relay.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the number of open connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Stops accepting and closes every connection.
    ///
    /// Sessions owned by the closed connections are released.
    pub fn shutdown(&self) {
        info!("Relay server shutting down");
        let _ = self.shutdown_tx.send(true);
    }
}

// ============================================================================
// RelayServer - Accept Loop
// ============================================================================

impl RelayServer {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let relay = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = relay.handle_connection(stream, addr).await {
                                warn!(error = %e, ?addr, "Connection handling failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                },

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one TCP stream and runs its connection until it closes.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let client_id = ClientId::next();
        self.connections.write().insert(client_id, addr);

        info!(client_id = %client_id, ?addr, "WebSocket client connected");

        let connection = ClientConnection::new(
            client_id,
            Arc::clone(&self.config),
            Arc::clone(&self.store),
        );
        connection
            .run(ws_stream, self.shutdown_tx.subscribe())
            .await;

        self.connections.write().remove(&client_id);

        info!(client_id = %client_id, ?addr, "WebSocket client disconnected");

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use futures_util::{SinkExt, Stream, StreamExt};
    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn start_relay() -> (Arc<RelayServer>, Arc<SessionStore>) {
        let store = Arc::new(SessionStore::default());
        let relay = RelayServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(BridgeConfig::default()),
            Arc::clone(&store),
        )
        .await
        .expect("relay bind");
        (relay, store)
    }

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("frame within timeout")
                .expect("stream open")
                .expect("frame ok");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).expect("json frame");
            }
        }
    }

    async fn wait_for_count(relay: &RelayServer, expected: usize) {
        for _ in 0..100 {
            if relay.connection_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("connection count never reached {expected}");
    }

    #[tokio::test]
    async fn test_relay_bind_random_port() {
        let (relay, _) = start_relay().await;
        assert!(relay.local_addr().port() > 0);
        assert!(relay.ws_url().starts_with("ws://127.0.0.1:"));
        assert_eq!(relay.connection_count(), 0);
        relay.shutdown();
    }

    #[tokio::test]
    async fn test_greeting_on_connect() {
        let (relay, _) = start_relay().await;
        let (mut ws, _) = connect_async(relay.ws_url()).await.expect("connect");

        let hello = next_json(&mut ws).await;
        assert_eq!(hello, json!({ "type": "connection", "status": "connected" }));
        relay.shutdown();
    }

    #[tokio::test]
    async fn test_register_uri_replies_on_same_socket() {
        let (relay, store) = start_relay().await;
        let (mut ws, _) = connect_async(relay.ws_url()).await.expect("connect");
        next_json(&mut ws).await;

        ws.send(Message::Text(
            json!({ "type": "walletconnect", "action": "register_uri", "uri": "wc:xyz@2" })
                .to_string()
                .into(),
        ))
        .await
        .expect("send");

        let reply = next_json(&mut ws).await;
        assert_eq!(reply["type"], "walletconnect");
        assert_eq!(reply["status"], "registered");

        let session_id = reply["sessionId"].as_str().expect("sessionId");
        assert!(!session_id.is_empty());
        assert!(
            reply["redirectUrl"]
                .as_str()
                .expect("redirectUrl")
                .contains("wc%3Axyz%402")
        );
        assert_eq!(store.get(session_id).unwrap().uri(), "wc:xyz@2");

        relay.shutdown();
    }

    #[tokio::test]
    async fn test_connections_are_isolated() {
        let (relay, _) = start_relay().await;
        let (mut a, _) = connect_async(relay.ws_url()).await.expect("connect a");
        let (mut b, _) = connect_async(relay.ws_url()).await.expect("connect b");
        next_json(&mut a).await;
        next_json(&mut b).await;

        a.send(Message::Text(
            json!({ "type": "walletconnect", "action": "register_uri", "uri": "wc:aaa@2" })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
        let reply_a = next_json(&mut a).await;

        // B only sees replies to its own frames.
        b.send(Message::Text(
            json!({ "type": "walletconnect", "action": "register_uri", "uri": "wc:bbb@2" })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
        let reply_b = next_json(&mut b).await;

        assert_eq!(reply_b["status"], "registered");
        assert!(reply_b["redirectUrl"].as_str().unwrap().contains("bbb"));
        assert_ne!(reply_a["sessionId"], reply_b["sessionId"]);

        relay.shutdown();
    }

    #[tokio::test]
    async fn test_generic_and_malformed_frames() {
        let (relay, _) = start_relay().await;
        let (mut ws, _) = connect_async(relay.ws_url()).await.expect("connect");
        next_json(&mut ws).await;

        ws.send(Message::Text(r#"{"hello":"world"}"#.into()))
            .await
            .unwrap();
        let ack = next_json(&mut ws).await;
        assert_eq!(ack["status"], "ok");

        ws.send(Message::Text("{broken".into())).await.unwrap();
        let err = next_json(&mut ws).await;
        assert_eq!(
            err,
            json!({ "status": "error", "message": "Failed to process message" })
        );

        // Socket stays usable after the error.
        ws.send(Message::Text(r#"{"again":true}"#.into()))
            .await
            .unwrap();
        assert_eq!(next_json(&mut ws).await["status"], "ok");

        relay.shutdown();
    }

    #[tokio::test]
    async fn test_close_releases_session() {
        let (relay, store) = start_relay().await;
        let (mut ws, _) = connect_async(relay.ws_url()).await.expect("connect");
        next_json(&mut ws).await;
        wait_for_count(&relay, 1).await;

        ws.send(Message::Text(
            json!({ "type": "walletconnect", "action": "register_uri", "uri": "wc:gone@2" })
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
        let reply = next_json(&mut ws).await;
        let session_id = reply["sessionId"].as_str().unwrap().to_string();
        assert!(store.get(&session_id).is_ok());

        ws.close(None).await.unwrap();
        wait_for_count(&relay, 0).await;

        assert!(store.get(&session_id).is_err());
        relay.shutdown();
    }
}
