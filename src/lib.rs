//! Wallet Bridge - pairing-URI relay and connection negotiator.
//!
//! This library moves a wallet pairing URI from the page that created it to
//! the view that displays it as a QR code, and negotiates how a user
//! connects a wallet in the first place.
//!
//! # Architecture
//!
//! The bridge follows a client-server model:
//!
//! - **Server side**: a WebSocket relay and a stateless HTTP facade share one
//!   in-memory [`SessionStore`]
//! - **Client side**: the [`Negotiator`] picks an injected provider, a
//!   wallet deep link, or QR pairing over a [`Transport`]
//!
//! ```text
//!   Negotiator ──► Transport ──► RelayServer / facade ──► SessionStore
//!       │                                                      │
//!       └──────────────► PairingView ◄─── GET /session ────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use wallet_bridge::{BridgeConfig, BridgeServer, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = BridgeConfig::from_env()?;
//!     let bridge = BridgeServer::bind(config).await?;
//!
//!     println!("relay: {:?}", bridge.relay_url());
//!     bridge.run().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Server lifecycle: listeners, eviction, shutdown |
//! | [`config`] | [`BridgeConfig`] loading and validation |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`negotiator`] | Connection strategy and state machine |
//! | [`pairing`] | QR rendering and copy-to-clipboard |
//! | [`protocol`] | Socket frames and HTTP bodies |
//! | [`session`] | TTL-bounded session store |
//! | [`transport`] | Relay, facade and client transports |

// ============================================================================
// Modules
// ============================================================================

/// Server lifecycle.
pub mod bridge;

/// Bridge configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wallet connection negotiation.
///
/// Use [`Negotiator::new`] with a [`BrowserHost`] and a [`WalletProvider`].
pub mod negotiator;

/// Pairing code presentation.
pub mod pairing;

/// Wire message types.
pub mod protocol;

/// Pairing session storage.
pub mod session;

/// Socket relay, HTTP facade and client transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Server types
pub use bridge::BridgeServer;
pub use config::{AppMetadata, BridgeConfig};
pub use session::{PairingSession, SessionStatus, SessionStore};

// Error types
pub use error::{Error, FailureReason, Result};

// Identifier types
pub use identifiers::{ClientId, SessionId};

// Negotiator types
pub use negotiator::{
    BrowserHost, DeviceProfile, Negotiator, NegotiatorConfig, NegotiatorEvent, NegotiatorState,
    WalletApp, WalletProvider,
};

// Pairing types
pub use pairing::{Clipboard, CopyNotice, PairingCode, PairingView, QrRenderer};

// Transport types
pub use transport::{
    BridgeEndpoints, HttpTransport, LinkState, ReconnectPolicy, Registration, RelayServer,
    SocketTransport, Transport, TransportKind,
};
