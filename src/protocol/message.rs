//! Socket frame types.
//!
//! All frames are JSON text messages.
//!
//! # Client → Relay
//!
//! ```json
//! { "type": "walletconnect", "action": "register_uri", "uri": "wc:..." }
//! { "type": "walletconnect", "action": "connect" }
//! { ...anything else... }
//! ```
//!
//! # Relay → Client
//!
//! ```json
//! { "type": "connection", "status": "connected" }
//! { "type": "walletconnect", "status": "registered", "sessionId": "...", "redirectUrl": "..." }
//! { "status": "ok", "message": "Message received" }
//! { "status": "error", "message": "Failed to process message" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// `type` value of wallet pairing frames.
const WALLETCONNECT_TYPE: &str = "walletconnect";

/// `type` value of connection frames.
const CONNECTION_TYPE: &str = "connection";

/// Message of the generic echo.
pub const ACK_MESSAGE: &str = "Message received";

/// Message sent when a frame cannot be processed.
pub const PROCESSING_FAILED: &str = "Failed to process message";

// ============================================================================
// ClientMessage
// ============================================================================

/// A frame sent by the browser to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Asks the relay to repeat the connection acknowledgment.
    Connect,
    /// Registers a pairing URI for this connection.
    RegisterUri {
        /// The pairing URI, untouched.
        uri: String,
    },
    /// Anything else. Acknowledged and otherwise ignored.
    Generic(Value),
}

impl ClientMessage {
    /// Creates a register frame.
    #[inline]
    #[must_use]
    pub fn register_uri(uri: impl Into<String>) -> Self {
        Self::RegisterUri { uri: uri.into() }
    }

    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not JSON
    /// - [`Error::InvalidUri`] if a register frame carries no string `uri`
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("type").and_then(Value::as_str) != Some(WALLETCONNECT_TYPE) {
            return Ok(Self::Generic(value));
        }

        match value.get("action").and_then(Value::as_str) {
            Some("register_uri") => {
                let uri = value
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_uri("URI is required"))?;
                Ok(Self::RegisterUri {
                    uri: uri.to_string(),
                })
            }
            Some("connect") => Ok(Self::Connect),
            _ => Ok(Self::Generic(value)),
        }
    }

    /// Serializes the frame to JSON text.
    #[must_use]
    pub fn to_json(&self) -> String {
        let value = match self {
            Self::Connect => json!({ "type": WALLETCONNECT_TYPE, "action": "connect" }),
            Self::RegisterUri { uri } => json!({
                "type": WALLETCONNECT_TYPE,
                "action": "register_uri",
                "uri": uri,
            }),
            Self::Generic(value) => value.clone(),
        };
        value.to_string()
    }
}

// ============================================================================
// ServerMessage
// ============================================================================

/// A frame sent by the relay to one browser connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent on accept and in reply to [`ClientMessage::Connect`].
    Connected,
    /// A URI was registered for this connection.
    Registered {
        /// Session the URI was stored under.
        session_id: String,
        /// Page rendering the pairing code.
        redirect_url: String,
    },
    /// Generic acknowledgment.
    Ack {
        /// Acknowledgment text.
        message: String,
    },
    /// The frame could not be processed. The socket stays open.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Creates the generic acknowledgment.
    #[inline]
    #[must_use]
    pub fn ack() -> Self {
        Self::Ack {
            message: ACK_MESSAGE.to_string(),
        }
    }

    /// Creates an error frame.
    #[inline]
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serializes the frame to JSON text.
    #[must_use]
    pub fn to_json(&self) -> String {
        let value = match self {
            Self::Connected => json!({ "type": CONNECTION_TYPE, "status": "connected" }),
            Self::Registered {
                session_id,
                redirect_url,
            } => json!({
                "type": WALLETCONNECT_TYPE,
                "status": "registered",
                "sessionId": session_id,
                "redirectUrl": redirect_url,
            }),
            Self::Ack { message } => json!({ "status": "ok", "message": message }),
            Self::Error { message } => json!({ "status": "error", "message": message }),
        };
        value.to_string()
    }

    /// Parses a text frame received from the relay.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not JSON
    /// - [`Error::Protocol`] if the shape matches no known frame
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let field = |key: &str| value.get(key).and_then(Value::as_str);

        match (field("type"), field("status")) {
            (Some(CONNECTION_TYPE), Some("connected")) => Ok(Self::Connected),
            (Some(WALLETCONNECT_TYPE), Some("registered")) => {
                let session_id = field("sessionId")
                    .ok_or_else(|| Error::protocol("registered frame without sessionId"))?;
                let redirect_url = field("redirectUrl").unwrap_or_default();
                Ok(Self::Registered {
                    session_id: session_id.to_string(),
                    redirect_url: redirect_url.to_string(),
                })
            }
            (_, Some("ok")) => Ok(Self::Ack {
                message: field("message").unwrap_or_default().to_string(),
            }),
            (_, Some("error")) => Ok(Self::Error {
                message: field("message").unwrap_or_default().to_string(),
            }),
            _ => Err(Error::protocol(format!("unrecognised frame: {text}"))),
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
    fn test_parse_register() {
        let msg =
            ClientMessage::parse(r#"{"type":"walletconnect","action":"register_uri","uri":"wc:xyz@2"}"#)
                .unwrap();
        assert_eq!(msg, ClientMessage::register_uri("wc:xyz@2"));
    }

    #[test]
    fn test_parse_register_without_uri() {
        let err = ClientMessage::parse(r#"{"type":"walletconnect","action":"register_uri"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUri { .. }));
    }

    #[test]
    fn test_parse_connect() {
        let msg = ClientMessage::parse(r#"{"type":"walletconnect","action":"connect"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Connect);
    }

    #[test]
    fn test_parse_generic() {
        let msg = ClientMessage::parse(r#"{"hello":"world"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Generic(_)));

        let msg = ClientMessage::parse("42").unwrap();
        assert!(matches!(msg, ClientMessage::Generic(_)));

        let msg = ClientMessage::parse(r#"{"type":"walletconnect","action":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Generic(_)));
    }

    #[test]
    fn test_parse_malformed() {
        let err = ClientMessage::parse("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_connected_frame_shape() {
        let value: Value = serde_json::from_str(&ServerMessage::Connected.to_json()).unwrap();
        assert_eq!(value, json!({ "type": "connection", "status": "connected" }));
    }

    #[test]
    fn test_registered_frame_shape() {
        let frame = ServerMessage::Registered {
            session_id: "abc".into(),
            redirect_url: "/qr-view.html?uri=wc%3Ax".into(),
        };
        let value: Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(value["type"], "walletconnect");
        assert_eq!(value["status"], "registered");
        assert_eq!(value["sessionId"], "abc");
        assert_eq!(value["redirectUrl"], "/qr-view.html?uri=wc%3Ax");
    }

    #[test]
    fn test_server_frames_parse_back() {
        for frame in [
            ServerMessage::Connected,
            ServerMessage::ack(),
            ServerMessage::error(PROCESSING_FAILED),
            ServerMessage::Registered {
                session_id: "s1".into(),
                redirect_url: "/r".into(),
            },
        ] {
            assert_eq!(ServerMessage::parse(&frame.to_json()).unwrap(), frame);
        }
    }

    #[test]
    fn test_server_parse_unknown() {
        let err = ServerMessage::parse(r#"{"type":"other"}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }
}
