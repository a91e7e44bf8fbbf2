//! Bridge server configuration.
//!
//! Configuration is loaded from a TOML file or from environment variables,
//! then validated before any listener is bound.
//!
//! # Example
//!
//! ```ignore
//! use wallet_bridge::BridgeConfig;
//!
//! let config = BridgeConfig::from_env()?;
//! config.validate()?;
//! ```
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `WALLET_BRIDGE_HTTP_ADDR` | `http_addr` (`off` disables) |
//! | `WALLET_BRIDGE_SOCKET_ADDR` | `socket_addr` (`off` disables) |
//! | `WALLET_BRIDGE_SESSION_TTL_SECS` | `session_ttl_secs` |
//! | `WALLET_BRIDGE_EVICTION_INTERVAL_SECS` | `eviction_interval_secs` |
//! | `WALLET_BRIDGE_URI_SCHEME` | `uri_scheme` |
//! | `WALLET_BRIDGE_RELAY_URL` | `relay_url` |
//! | `WALLET_CONNECT_PROJECT_ID` | `project_id` |
//! | `APP_DOMAIN` | `domain` |

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Session lifetime: 30 minutes.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Interval of the background expiry sweep.
pub const DEFAULT_EVICTION_INTERVAL_SECS: u64 = 60;

/// Scheme prefix every pairing URI must carry.
pub const DEFAULT_URI_SCHEME: &str = "wc:";

/// Page that renders a pairing code for a `uri` query parameter.
pub const DEFAULT_REDIRECT_PATH: &str = "/qr-view.html";

/// Public relay used by wallets to exchange pairing messages.
pub const DEFAULT_RELAY_URL: &str = "wss://relay.walletconnect.org";

/// Value that disables a listener in environment overrides.
const DISABLED: &str = "off";

// ============================================================================
// AppMetadata
// ============================================================================

/// Application metadata handed opaquely to pairing-URI generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Display name shown in the wallet.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Application origin.
    pub url: String,
    /// Icon URLs.
    pub icons: Vec<String>,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "JAVURO".to_string(),
            description: "JAVURO Web3 Application".to_string(),
            url: "https://javuro.com".to_string(),
            icons: vec!["https://javuro.com/favicon.png".to_string()],
        }
    }
}

// ============================================================================
// BridgeConfig
// ============================================================================

/// Configuration for the relay server and the HTTP facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listen address of the HTTP facade. `None` disables it.
    pub http_addr: Option<SocketAddr>,
    /// Listen address of the persistent socket relay. `None` disables it.
    pub socket_addr: Option<SocketAddr>,

    /// Pairing session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Interval between background expiry sweeps in seconds.
    pub eviction_interval_secs: u64,

    /// Required prefix of registered URIs.
    pub uri_scheme: String,
    /// Path the redirect URL points at.
    pub redirect_path: String,

    /// Pairing project identifier. No built-in fallback.
    pub project_id: Option<String>,
    /// Public domain of the application.
    pub domain: Option<String>,
    /// Relay endpoint used by the wallet protocol.
    pub relay_url: String,
    /// Application metadata.
    pub metadata: AppMetadata,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            http_addr: Some(SocketAddr::from(([0, 0, 0, 0], 5000))),
            socket_addr: Some(SocketAddr::from(([0, 0, 0, 0], 5001))),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            eviction_interval_secs: DEFAULT_EVICTION_INTERVAL_SECS,
            uri_scheme: DEFAULT_URI_SCHEME.to_string(),
            redirect_path: DEFAULT_REDIRECT_PATH.to_string(),
            project_id: None,
            domain: None,
            relay_url: DEFAULT_RELAY_URL.to_string(),
            metadata: AppMetadata::default(),
        }
    }
}

// ============================================================================
// BridgeConfig - Loading
// ============================================================================

impl BridgeConfig {
    /// Builds a configuration from defaults plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads a TOML configuration file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Config`] if the TOML is invalid
    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TOML is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {e}")))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup("WALLET_BRIDGE_HTTP_ADDR") {
            config.http_addr = parse_listener("WALLET_BRIDGE_HTTP_ADDR", &value)?;
        }

        if let Some(value) = lookup("WALLET_BRIDGE_SOCKET_ADDR") {
            config.socket_addr = parse_listener("WALLET_BRIDGE_SOCKET_ADDR", &value)?;
        }

        if let Some(value) = lookup("WALLET_BRIDGE_SESSION_TTL_SECS") {
            config.session_ttl_secs = parse_secs("WALLET_BRIDGE_SESSION_TTL_SECS", &value)?;
        }

        if let Some(value) = lookup("WALLET_BRIDGE_EVICTION_INTERVAL_SECS") {
            config.eviction_interval_secs =
                parse_secs("WALLET_BRIDGE_EVICTION_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = lookup("WALLET_BRIDGE_URI_SCHEME") {
            config.uri_scheme = value;
        }

        if let Some(value) = lookup("WALLET_BRIDGE_RELAY_URL") {
            config.relay_url = value;
        }

        config.project_id = lookup("WALLET_CONNECT_PROJECT_ID").filter(|v| !v.trim().is_empty());
        config.domain = lookup("APP_DOMAIN").filter(|v| !v.trim().is_empty());

        Ok(config)
    }
}

// ============================================================================
// BridgeConfig - Validation & Accessors
// ============================================================================

impl BridgeConfig {
    /// Checks the configuration for values the bridge cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 {
            return Err(Error::config("session_ttl_secs must be > 0"));
        }

        if self.eviction_interval_secs == 0 {
            return Err(Error::config("eviction_interval_secs must be > 0"));
        }

        if self.uri_scheme.trim().is_empty() {
            return Err(Error::config("uri_scheme must not be empty"));
        }

        if self.http_addr.is_none() && self.socket_addr.is_none() {
            return Err(Error::config(
                "at least one of http_addr and socket_addr must be enabled",
            ));
        }

        Url::parse(&self.relay_url)
            .map_err(|e| Error::config(format!("relay_url is not a URL: {e}")))?;

        Ok(())
    }

    /// Returns the session lifetime.
    #[inline]
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Returns the expiry sweep interval.
    #[inline]
    #[must_use]
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Builds the redirect URL for a pairing URI.
    ///
    /// Format: `{redirect_path}?uri={percent-encoded uri}`
    #[must_use]
    pub fn redirect_url(&self, uri: &str) -> String {
        format!("{}?uri={}", self.redirect_path, urlencoding::encode(uri))
    }

    /// Checks that a pairing URI is non-empty and carries the scheme prefix.
    ///
    /// The URI is never parsed beyond the prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] otherwise.
    pub fn validate_uri(&self, uri: &str) -> Result<()> {
        if uri.trim().is_empty() {
            return Err(Error::invalid_uri("URI is required"));
        }

        if !uri.starts_with(&self.uri_scheme) {
            return Err(Error::invalid_uri(format!(
                "Invalid URI format: expected '{}' prefix",
                self.uri_scheme
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_listener(key: &str, value: &str) -> Result<Option<SocketAddr>> {
    if value.trim().eq_ignore_ascii_case(DISABLED) {
        return Ok(None);
    }

    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e| Error::config(format!("{key}: invalid socket address '{value}': {e}")))
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{key}: invalid number '{value}': {e}")))
}

// ============================================================================
// Tests
// ============================================================================
