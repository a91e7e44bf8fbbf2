//! Persistent-socket client for the relay.
//!
//! # Event Loop
//!
//! The transport spawns one task that owns the socket:
//!
//! - Sends register frames queued by [`Transport::register_uri`]
//! - Matches `registered` and `error` replies to callers in FIFO order
//! - Remembers the one session the relay holds for this link
//! - Reconnects on drop per [`ReconnectPolicy`], then stops quietly
//!
//! ```text
//! Connecting ──ok──► Connected ──drop──► Reconnecting{n} ──► Connecting
//!     │                                        │
//!     └─────────────fail───────────────────────┘
//!                        n > max ──► GaveUp
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::config::DEFAULT_SESSION_TTL_SECS;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::{ClientMessage, ServerMessage};

use super::client::{Registration, Transport, TransportKind};
use super::reconnect::ReconnectPolicy;

// ============================================================================
// Types
// ============================================================================

type RelayStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Callers waiting for a registration reply, oldest first.
type PendingQueue = VecDeque<PendingRegistration>;

struct PendingRegistration {
    uri: String,
    /// Computed before the frame is sent, so never later than the relay's.
    expires_at: Instant,
    reply_tx: oneshot::Sender<Result<Registration>>,
}

/// The session the relay holds for this link.
///
/// The relay keeps at most one session per connection: a new registration
/// replaces it and a dropped link releases it.
#[derive(Debug, Clone)]
struct OwnedSession {
    session_id: SessionId,
    uri: String,
    expires_at: Instant,
}

type SessionSlot = Option<OwnedSession>;

// ============================================================================
// LinkState
// ============================================================================

/// Observable state of the relay link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Opening the socket.
    Connecting,
    /// Socket open.
    Connected,
    /// Waiting before reconnection attempt `attempt`.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Reconnection attempts exhausted. Terminal.
    GaveUp {
        /// Attempts made.
        attempts: u32,
    },
    /// Closed by the caller. Terminal.
    Closed,
}

impl LinkState {
    /// Returns `true` if the link will never reconnect.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::GaveUp { .. } | Self::Closed)
    }
}

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Register a URI and reply on `reply_tx`.
    Register(PendingRegistration),
    /// Close the socket and stop.
    Close,
}

/// Why one connected session of the loop ended.
enum SessionEnd {
    Dropped,
    Closed,
}

// ============================================================================
// SocketTransport
// ============================================================================

/// Transport holding a WebSocket open to the relay.
///
/// Cheap to share: all I/O happens in the background task.
pub struct SocketTransport {
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    owned: Arc<Mutex<SessionSlot>>,
    link_rx: watch::Receiver<LinkState>,
    session_ttl: Duration,
}

impl SocketTransport {
    /// Starts connecting to the relay at `url`.
    ///
    /// Returns immediately; the link state is observable through
    /// [`SocketTransport::link_state`]. Must be called within a tokio
    /// runtime.
    #[must_use]
    pub fn connect(url: &str, policy: ReconnectPolicy) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = watch::channel(LinkState::Connecting);
        let owned = Arc::new(Mutex::new(None));

        tokio::spawn(run_link(
            url.to_string(),
            policy,
            command_rx,
            link_tx,
            Arc::clone(&owned),
        ));

        Self {
            command_tx,
            owned,
            link_rx,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }

    /// Sets the session lifetime the relay is configured with.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Returns the current link state.
    #[inline]
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        *self.link_rx.borrow()
    }

    /// Returns a receiver notified on every link state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.link_rx.clone()
    }

    /// Waits until the link reaches a terminal state.
    pub async fn wait_terminal(&self) -> LinkState {
        let mut rx = self.link_rx.clone();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => LinkState::Closed,
        }
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn register_uri(&self, uri: &str) -> Result<Registration> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(SocketCommand::Register(PendingRegistration {
                uri: uri.to_string(),
                expires_at: Instant::now() + self.session_ttl,
                reply_tx,
            }))
            .map_err(|_| Error::ConnectionClosed)?;

        reply_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    async fn get_session(&self, session_id: &str) -> Result<String> {
        let mut owned = self.owned.lock();
        let (uri, expired) = match owned.as_ref() {
            Some(session) if session.session_id.as_str() == session_id => {
                (session.uri.clone(), Instant::now() >= session.expires_at)
            }
            _ => return Err(Error::session_not_found(session_id)),
        };

        if expired {
            *owned = None;
            return Err(Error::session_not_found(session_id));
        }
        Ok(uri)
    }

    async fn close(&self) {
        let _ = self.command_tx.send(SocketCommand::Close);
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        let _ = self.command_tx.send(SocketCommand::Close);
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Supervises the link: connect, serve, back off, give up.
async fn run_link(
    url: String,
    policy: ReconnectPolicy,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    link_tx: watch::Sender<LinkState>,
    owned: Arc<Mutex<SessionSlot>>,
) {
    let mut tracker = policy.tracker();

    loop {
        link_tx.send_replace(LinkState::Connecting);

        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!(%url, "Relay socket connected");
                tracker.reset();
                link_tx.send_replace(LinkState::Connected);

                match serve(ws_stream, &mut command_rx, &owned).await {
                    SessionEnd::Closed => break,
                    SessionEnd::Dropped => debug!(%url, "Relay socket dropped"),
                }
            }
            Err(e) => {
                debug!(%url, error = %e, "Relay socket connect failed");
            }
        }

        let Some(delay) = tracker.next_delay() else {
            info!(
                %url,
                attempts = tracker.attempts(),
                "Relay unreachable, giving up on the persistent socket"
            );
            link_tx.send_replace(LinkState::GaveUp {
                attempts: tracker.attempts(),
            });
            return;
        };

        link_tx.send_replace(LinkState::Reconnecting {
            attempt: tracker.attempts(),
        });

        if !backoff(delay, &mut command_rx).await {
            break;
        }
    }

    link_tx.send_replace(LinkState::Closed);
    debug!(%url, "Relay link closed");
}

/// Sleeps for `delay`, refusing registrations meanwhile.
///
/// Returns `false` if the transport was closed.
async fn backoff(
    delay: std::time::Duration,
    command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => return true,
            command = command_rx.recv() => match command {
                Some(SocketCommand::Register(pending)) => {
                    let _ = pending
                        .reply_tx
                        .send(Err(Error::connection("relay socket is reconnecting")));
                }
                Some(SocketCommand::Close) | None => return false,
            },
        }
    }
}

/// Serves one connected socket until it drops or is closed.
async fn serve(
    ws_stream: RelayStream,
    command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    owned: &Mutex<SessionSlot>,
) -> SessionEnd {
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut pending = PendingQueue::new();

    let end = loop {
        tokio::select! {
            message = ws_read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_incoming(text.as_str(), &mut pending, owned);
                }
                Some(Ok(Message::Close(_))) | None => break SessionEnd::Dropped,
                Some(Err(e)) => {
                    warn!(error = %e, "Relay socket error");
                    break SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
            },

            command = command_rx.recv() => match command {
                Some(SocketCommand::Register(registration)) => {
                    let frame = ClientMessage::register_uri(registration.uri.as_str()).to_json();
                    if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                        let _ = registration
                            .reply_tx
                            .send(Err(Error::connection(e.to_string())));
                        break SessionEnd::Dropped;
                    }
                    pending.push_back(registration);
                }
                Some(SocketCommand::Close) | None => {
                    let _ = ws_write.close().await;
                    break SessionEnd::Closed;
                }
            },
        }
    };

    fail_pending(&mut pending);

    // The relay releases a connection's session when the socket goes away.
    if let Some(released) = owned.lock().take() {
        debug!(session_id = %released.session_id, "Owned session released with the link");
    }
    end
}

/// Routes one relay frame to the oldest waiting caller.
fn handle_incoming(text: &str, pending: &mut PendingQueue, owned: &Mutex<SessionSlot>) {
    let message = match ServerMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Unrecognised relay frame");
            return;
        }
    };

    match message {
        ServerMessage::Registered {
            session_id,
            redirect_url,
        } => {
            let Some(waiter) = pending.pop_front() else {
                warn!(%session_id, "Registration reply without a waiting caller");
                return;
            };
            let session_id = SessionId::new(session_id);
            *owned.lock() = Some(OwnedSession {
                session_id: session_id.clone(),
                uri: waiter.uri.clone(),
                expires_at: waiter.expires_at,
            });
            trace!(%session_id, "Registration confirmed");
            let _ = waiter.reply_tx.send(Ok(Registration {
                session_id,
                uri: waiter.uri,
                redirect_url,
            }));
        }
        ServerMessage::Error { message } => match pending.pop_front() {
            Some(waiter) => {
                let _ = waiter.reply_tx.send(Err(Error::invalid_uri(message)));
            }
            None => debug!(%message, "Relay reported an error"),
        },
        ServerMessage::Connected | ServerMessage::Ack { .. } => {}
    }
}

/// Fails all waiting callers with [`Error::ConnectionClosed`].
fn fail_pending(pending: &mut PendingQueue) {
    let count = pending.len();
    for waiter in pending.drain(..) {
        let _ = waiter.reply_tx.send(Err(Error::ConnectionClosed));
    }
    if count > 0 {
        debug!(count, "Failed pending registrations on disconnect");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    /// Returns a loopback URL nothing is listening on.
    async fn dead_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}")
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_policy_exhausted() {
        let url = dead_url().await;
        let started = tokio::time::Instant::now();

        let transport = SocketTransport::connect(&url, ReconnectPolicy::default());
        let state = transport.wait_terminal().await;

        assert_eq!(state, LinkState::GaveUp { attempts: 5 });
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_after_give_up_fails_cleanly() {
        let url = dead_url().await;
        let transport = SocketTransport::connect(&url, ReconnectPolicy::new(1, Duration::from_secs(3)));
        transport.wait_terminal().await;

        let err = transport.register_uri("wc:late@2").await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert_eq!(err.failure_reason(), crate::error::FailureReason::TransportUnavailable);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let url = dead_url().await;
        let transport = SocketTransport::connect(&url, ReconnectPolicy::new(100, Duration::from_secs(60)));
        transport.close().await;
        assert_eq!(transport.wait_terminal().await, LinkState::Closed);
    }

    #[test]
    fn test_incoming_registered_resolves_oldest() {
        let owned = Mutex::new(SessionSlot::None);
        let mut pending = PendingQueue::new();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        pending.push_back(PendingRegistration {
            uri: "wc:one@2".into(),
            expires_at: Instant::now() + Duration::from_secs(60),
            reply_tx: tx1,
        });
        pending.push_back(PendingRegistration {
            uri: "wc:two@2".into(),
            expires_at: Instant::now() + Duration::from_secs(60),
            reply_tx: tx2,
        });

        let frame = ServerMessage::Registered {
            session_id: "s1".into(),
            redirect_url: "/r".into(),
        };
        handle_incoming(&frame.to_json(), &mut pending, &owned);

        let first = rx1.try_recv().unwrap().unwrap();
        assert_eq!(first.uri, "wc:one@2");
        assert_eq!(first.session_id.as_str(), "s1");
        assert!(rx2.try_recv().is_err());
        assert_eq!(
            owned.lock().as_ref().map(|session| session.uri.as_str()),
            Some("wc:one@2")
        );

        handle_incoming(&ServerMessage::error("bad").to_json(), &mut pending, &owned);
        assert!(matches!(
            rx2.try_recv().unwrap(),
            Err(Error::InvalidUri { .. })
        ));
    }

    #[test]
    fn test_new_registration_replaces_owned_session() {
        let owned = Mutex::new(SessionSlot::None);
        let mut pending = PendingQueue::new();

        for (uri, id) in [("wc:first@2", "s1"), ("wc:second@2", "s2")] {
            let (tx, _rx) = oneshot::channel();
            pending.push_back(PendingRegistration {
                uri: uri.into(),
                expires_at: Instant::now() + Duration::from_secs(60),
                reply_tx: tx,
            });
            let frame = ServerMessage::Registered {
                session_id: id.into(),
                redirect_url: "/r".into(),
            };
            handle_incoming(&frame.to_json(), &mut pending, &owned);
        }

        let slot = owned.lock();
        let session = slot.as_ref().unwrap();
        assert_eq!(session.session_id.as_str(), "s2");
        assert_eq!(session.uri, "wc:second@2");
    }

    #[tokio::test]
    async fn test_get_session_honours_expiry() {
        let transport = SocketTransport::connect(&dead_url().await, ReconnectPolicy::never());
        *transport.owned.lock() = Some(OwnedSession {
            session_id: SessionId::new("live"),
            uri: "wc:live@2".into(),
            expires_at: Instant::now() + Duration::from_secs(60),
        });
        assert_eq!(transport.get_session("live").await.unwrap(), "wc:live@2");
        assert!(matches!(
            transport.get_session("other").await,
            Err(Error::SessionNotFound { .. })
        ));

        *transport.owned.lock() = Some(OwnedSession {
            session_id: SessionId::new("stale"),
            uri: "wc:stale@2".into(),
            expires_at: Instant::now(),
        });
        assert!(matches!(
            transport.get_session("stale").await,
            Err(Error::SessionNotFound { .. })
        ));
        assert!(transport.owned.lock().is_none());
    }

    #[test]
    fn test_fail_pending() {
        let mut pending = PendingQueue::new();
        let (tx, mut rx) = oneshot::channel();
        pending.push_back(PendingRegistration {
            uri: "wc:x@2".into(),
            expires_at: Instant::now(),
            reply_tx: tx,
        });

        fail_pending(&mut pending);
        assert!(pending.is_empty());
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::ConnectionClosed)));
    }
}
