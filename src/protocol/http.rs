//! HTTP facade request and response bodies.
//!
//! Field names are camelCase on the wire to match the browser client.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::config::AppMetadata;

// ============================================================================
// ResponseStatus
// ============================================================================

/// The `status` discriminator carried by every facade response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Request handled.
    Success,
    /// Request failed; see `message`.
    Error,
    /// Liveness probe.
    Ok,
}

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /register`.
///
/// `uri` is optional so a missing field reaches validation instead of
/// failing deserialization with a less helpful message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Pairing URI to store.
    #[serde(default)]
    pub uri: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

/// Success body of `POST /register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// Always [`ResponseStatus::Success`].
    pub status: ResponseStatus,
    /// New session id.
    pub session_id: String,
    /// The stored URI, unchanged.
    pub uri: String,
    /// Page rendering the pairing code.
    pub redirect_url: String,
}

/// Success body of `GET /session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Always [`ResponseStatus::Success`].
    pub status: ResponseStatus,
    /// The stored URI.
    pub uri: String,
    /// Pairing project id, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Application domain, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Body of `GET /config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    /// Pairing project id.
    pub project_id: String,
    /// Relay endpoint for the wallet protocol.
    pub relay_url: String,
    /// Application metadata.
    pub metadata: AppMetadata,
}

/// Body returned for any failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always [`ResponseStatus::Error`].
    pub status: ResponseStatus,
    /// Human-readable reason.
    pub message: String,
}

impl ErrorBody {
    /// Creates an error body.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }
}

/// Payload for unroutable paths, mimicking the socket hello.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAck {
    /// Always `connection`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Always `connected`.
    pub status: String,
    /// Explains the fallback.
    pub note: String,
}

impl Default for ConnectionAck {
    fn default() -> Self {
        Self {
            kind: "connection".to_string(),
            status: "connected".to_string(),
            note: "Stateless pairing endpoint: use POST /register and GET /session.".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
