//! Transport layer: relay server, HTTP facade, and the client transports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐      WebSocket       ┌──────────────┐
//! │ SocketTransport │◄────────────────────►│ RelayServer  │──┐
//! └─────────────────┘                      └──────────────┘  │
//!                                                            ▼
//!                                                     ┌──────────────┐
//!                                                     │ SessionStore │
//!                                                     └──────────────┘
//! ┌─────────────────┐   POST /register     ┌──────────────┐  ▲
//! │  HttpTransport  │─────────────────────►│ HTTP facade  │──┘
//! └─────────────────┘   GET /session       └──────────────┘
//! ```
//!
//! Both server sides share one [`SessionStore`](crate::session::SessionStore).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `server` | Relay accept loop |
//! | `connection` | Relay per-connection handler |
//! | `facade` | Stateless HTTP router |
//! | `client` | [`Transport`] trait and selection |
//! | `socket` | Persistent-socket client |
//! | `http` | HTTP facade client |
//! | `reconnect` | Reconnection policy |

// ============================================================================
// Submodules
// ============================================================================

/// Client transport trait and selection.
pub mod client;

/// Relay per-connection handler.
pub(crate) mod connection;

/// Stateless HTTP facade.
pub mod facade;

/// HTTP facade client.
pub mod http;

/// Reconnection policy.
pub mod reconnect;

/// Relay server.
pub mod server;

/// Persistent-socket client.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::{BridgeEndpoints, Registration, Transport, TransportKind};
pub use facade::{FacadeState, router};
pub use http::HttpTransport;
pub use reconnect::{ReconnectPolicy, ReconnectTracker};
pub use server::RelayServer;
pub use socket::{LinkState, SocketTransport};
