//! Client-side transport abstraction.
//!
//! The negotiator registers pairing URIs through a [`Transport`] and does
//! not care which one it got. Two implementations exist:
//!
//! | Transport | Use when |
//! |-----------|----------|
//! | [`SocketTransport`](super::SocketTransport) | the environment keeps sockets open |
//! | [`HttpTransport`](super::HttpTransport) | serverless hosts, restricted networks |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::http::HttpTransport;
use super::reconnect::ReconnectPolicy;
use super::socket::SocketTransport;

// ============================================================================
// Registration
// ============================================================================

/// Outcome of registering a pairing URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Session the URI is stored under.
    pub session_id: SessionId,
    /// The URI as registered.
    pub uri: String,
    /// Page rendering the pairing code for this URI.
    pub redirect_url: String,
}

// ============================================================================
// TransportKind
// ============================================================================

/// Which transport a client is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Persistent WebSocket to the relay.
    Socket,
    /// Stateless request/response facade.
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket => f.write_str("socket"),
            Self::Http => f.write_str("http"),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Registers and retrieves pairing URIs on the bridge.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns which transport this is.
    fn kind(&self) -> TransportKind;

    /// Stores `uri` and returns its registration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUri`] if the bridge rejects the URI
    /// - a connection error if the bridge is unreachable
    async fn register_uri(&self, uri: &str) -> Result<Registration>;

    /// Fetches the URI stored under `session_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if the session is unknown or expired
    /// - a connection error if the bridge is unreachable
    async fn get_session(&self, session_id: &str) -> Result<String>;

    /// Releases any held resources.
    async fn close(&self) {}
}

// ============================================================================
// Endpoints
// ============================================================================

/// Where the bridge is reachable from the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeEndpoints {
    /// Relay WebSocket URL, e.g. `ws://host:5001`.
    pub socket_url: Option<String>,
    /// Facade base URL, e.g. `https://host/wallet-connect`.
    pub facade_url: Option<String>,
    /// Reconnection policy for the socket transport.
    pub reconnect: ReconnectPolicy,
}

impl BridgeEndpoints {
    /// Picks the transport for an environment.
    ///
    /// The persistent socket is used when the environment supports it and
    /// a relay URL is known. Otherwise the HTTP facade is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no usable endpoint is configured.
    pub fn select(&self, supports_persistent_socket: bool) -> Result<Arc<dyn Transport>> {
        if supports_persistent_socket && let Some(url) = &self.socket_url {
            return Ok(Arc::new(SocketTransport::connect(url, self.reconnect)));
        }

        match &self.facade_url {
            Some(url) => Ok(Arc::new(HttpTransport::new(url)?)),
            None => Err(Error::config("no bridge endpoint configured")),
        }
    }

    /// Returns the HTTP facade when `primary` is not already using it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the facade URL is invalid.
    pub fn fallback_for(&self, primary: TransportKind) -> Result<Option<Arc<dyn Transport>>> {
        match (&self.facade_url, primary) {
            (Some(url), TransportKind::Socket) => Ok(Some(Arc::new(HttpTransport::new(url)?))),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(TransportKind::Socket.to_string(), "socket");
        assert_eq!(TransportKind::Http.to_string(), "http");
    }

    #[test]
    fn test_select_requires_endpoint() {
        let endpoints = BridgeEndpoints::default();
        let err = endpoints.select(true).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_select_http_without_socket_support() {
        let endpoints = BridgeEndpoints {
            socket_url: Some("ws://127.0.0.1:1".into()),
            facade_url: Some("http://127.0.0.1:1/wallet-connect".into()),
            ..BridgeEndpoints::default()
        };
        let transport = endpoints.select(false).unwrap();
        assert_eq!(transport.kind(), TransportKind::Http);
        assert!(endpoints.fallback_for(TransportKind::Http).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_socket_when_supported() {
        let endpoints = BridgeEndpoints {
            socket_url: Some("ws://127.0.0.1:1".into()),
            facade_url: Some("http://127.0.0.1:1".into()),
            reconnect: ReconnectPolicy::never(),
        };
        let transport = endpoints.select(true).unwrap();
        assert_eq!(transport.kind(), TransportKind::Socket);

        let fallback = endpoints.fallback_for(TransportKind::Socket).unwrap();
        assert_eq!(fallback.map(|t| t.kind()), Some(TransportKind::Http));
        transport.close().await;
    }

    #[test]
    fn test_select_http_only() {
        let endpoints = BridgeEndpoints {
            facade_url: Some("http://127.0.0.1:1".into()),
            ..BridgeEndpoints::default()
        };
        assert_eq!(endpoints.select(true).unwrap().kind(), TransportKind::Http);
    }
}
