//! Error types for the wallet pairing bridge.
//!
//! This module defines all error types used throughout the crate, and the
//! coarse [`FailureReason`] taxonomy the negotiator surfaces to users.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wallet_bridge::{Result, SessionStore};
//!
//! fn lookup(store: &SessionStore, id: &str) -> Result<String> {
//!     let session = store.get(id)?;
//!     Ok(session.uri().to_string())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Input | [`Error::InvalidUri`], [`Error::MissingSessionId`], [`Error::Protocol`] |
//! | Session | [`Error::SessionNotFound`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Timeout`] |
//! | Wallet | [`Error::UserRejected`], [`Error::Encoding`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when bridge or negotiator configuration is invalid, or when
    /// a transport cannot be initialised in the current environment.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Pairing URI missing or not in the expected scheme.
    #[error("Invalid URI: {message}")]
    InvalidUri {
        /// Description of what is wrong with the URI.
        message: String,
    },

    /// Session lookup without a session id.
    #[error("Session ID is required")]
    MissingSessionId,

    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Session unknown or expired.
    ///
    /// Recoverable: the caller may request a fresh session.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The session id that was looked up.
        session_id: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Wallet Errors
    // ========================================================================
    /// The user declined the connection request or cancelled pairing.
    #[error("Request rejected: {message}")]
    UserRejected {
        /// Description from the wallet or the cancelling action.
        message: String,
    },

    /// Pairing code could not be rendered.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of the encoding failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URI error.
    #[inline]
    pub fn invalid_uri(message: impl Into<String>) -> Self {
        Self::InvalidUri {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a session not found error.
    #[inline]
    pub fn session_not_found(session_id: impl fmt::Display) -> Self {
        Self::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a user rejection error.
    #[inline]
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::UserRejected {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    #[inline]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a caller input error.
    #[inline]
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUri { .. } | Self::MissingSessionId | Self::Protocol { .. } | Self::Json(_)
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_) | Self::Http(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry or with a fresh session.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound { .. }
                | Self::Timeout { .. }
                | Self::Connection { .. }
                | Self::ConnectionClosed
        )
    }

    /// Classifies the error for user-facing reporting.
    #[must_use]
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::UserRejected { .. } => FailureReason::UserRejected,
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::Config { .. } => FailureReason::Configuration,
            Self::Connection { .. }
            | Self::ConnectionClosed
            | Self::WebSocket(_)
            | Self::Http(_)
            | Self::Io(_) => FailureReason::TransportUnavailable,
            _ => FailureReason::Unknown,
        }
    }

    /// Returns the text reported back to the peer that caused the error.
    ///
    /// URI validation errors report their bare description, matching the
    /// text sent when a register frame carries no URI at all.
    #[must_use]
    pub fn peer_message(&self) -> String {
        match self {
            Self::InvalidUri { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// FailureReason
// ============================================================================

/// Why a connection attempt ended in the failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The user declined in the wallet or cancelled pairing.
    UserRejected,
    /// No transport could reach the relay or the wallet.
    TransportUnavailable,
    /// Pairing did not complete in time.
    Timeout,
    /// The environment cannot host a wallet connection.
    Configuration,
    /// Anything else.
    Unknown,
}

impl FailureReason {
    /// Returns the wire name (`user_rejected`, `transport_unavailable`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRejected => "user_rejected",
            Self::TransportUnavailable => "transport_unavailable",
            Self::Timeout => "timeout",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the message shown to the user for this failure.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::UserRejected => "The connection request was rejected. Please try again.",
            Self::TransportUnavailable => {
                "Could not reach the wallet. Check your connection and try again."
            }
            Self::Timeout => "The wallet did not respond in time. Please try again.",
            Self::Configuration => {
                "Wallet connection is not available here. Reload in a supported browser."
            }
            Self::Unknown => "Wallet connection failed. Please try again.",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_peer_message() {
        assert_eq!(Error::invalid_uri("URI is required").peer_message(), "URI is required");
        assert_eq!(
            Error::MissingSessionId.peer_message(),
            "Session ID is required"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection("relay unreachable");
        assert_eq!(err.to_string(), "Connection failed: relay unreachable");
    }

    #[test]
    fn test_missing_session_id_display() {
        assert_eq!(Error::MissingSessionId.to_string(), "Session ID is required");
    }

    #[test]
    fn test_is_input_error() {
        assert!(Error::invalid_uri("empty").is_input_error());
        assert!(Error::MissingSessionId.is_input_error());
        assert!(!Error::ConnectionClosed.is_input_error());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_session_not_found_is_recoverable() {
        let err = Error::session_not_found("abc");
        assert!(err.is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_failure_reason_mapping() {
        assert_eq!(
            Error::user_rejected("declined").failure_reason(),
            FailureReason::UserRejected
        );
        assert_eq!(
            Error::timeout("pairing", 1000).failure_reason(),
            FailureReason::Timeout
        );
        assert_eq!(
            Error::config("no window").failure_reason(),
            FailureReason::Configuration
        );
        assert_eq!(
            Error::ConnectionClosed.failure_reason(),
            FailureReason::TransportUnavailable
        );
        assert_eq!(
            Error::encoding("too long").failure_reason(),
            FailureReason::Unknown
        );
    }

    #[test]
    fn test_failure_reason_wire_name() {
        let json = serde_json::to_string(&FailureReason::TransportUnavailable).unwrap();
        assert_eq!(json, "\"transport_unavailable\"");
        assert_eq!(FailureReason::UserRejected.to_string(), "user_rejected");
    }

    #[test]
    fn test_every_reason_has_message() {
        for reason in [
            FailureReason::UserRejected,
            FailureReason::TransportUnavailable,
            FailureReason::Timeout,
            FailureReason::Configuration,
            FailureReason::Unknown,
        ] {
            assert!(!reason.user_message().is_empty());
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.failure_reason(), FailureReason::TransportUnavailable);
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
