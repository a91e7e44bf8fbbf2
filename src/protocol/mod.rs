//! Wire message types.
//!
//! This module defines the JSON shapes exchanged between the browser and
//! the bridge, over both transports.
//!
//! # Protocol Overview
//!
//! | Message | Transport | Direction | Purpose |
//! |---------|-----------|-----------|---------|
//! | [`ClientMessage`] | socket | Browser → Relay | Register a URI, reconnect hello, generic echo |
//! | [`ServerMessage`] | socket | Relay → Browser | Connection ack, registration, echo, error |
//! | [`RegisterRequest`] / [`RegisterResponse`] | HTTP | both | `POST /register` |
//! | [`SessionResponse`] | HTTP | Facade → Browser | `GET /session` |
//! | [`ConfigResponse`] | HTTP | Facade → Browser | `GET /config` |
//! | [`ErrorBody`] | HTTP | Facade → Browser | Any error |
//!
//! Socket frames are parsed once, at the transport boundary, into tagged
//! variants. Nothing past the boundary inspects raw JSON.

// ============================================================================
// Submodules
// ============================================================================

/// HTTP facade request and response bodies.
pub mod http;

/// Socket frame types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use http::{
    ConfigResponse, ConnectionAck, ErrorBody, RegisterRequest, RegisterResponse,
    ResponseStatus, SessionResponse,
};
pub use message::{ClientMessage, ServerMessage};
