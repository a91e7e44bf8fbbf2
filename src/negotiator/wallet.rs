//! Wallet apps and the browser-side capabilities the negotiator drives.
//!
//! The negotiator never touches a browser directly. Embedders implement
//! [`BrowserHost`] and [`WalletProvider`] for their runtime.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Local-storage key prefixes left behind by earlier pairing attempts.
pub const PAIRING_ARTIFACT_PREFIXES: [&str; 2] = ["wc@", "walletconnect"];

// ============================================================================
// WalletApp
// ============================================================================

/// Mobile wallet apps reachable by deep link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletApp {
    /// MetaMask mobile.
    MetaMask,
    /// Trust Wallet.
    TrustWallet,
    /// imToken.
    ImToken,
}

impl WalletApp {
    /// Every known app, in picker order.
    pub const ALL: [Self; 3] = [Self::MetaMask, Self::TrustWallet, Self::ImToken];

    /// Returns the display name.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MetaMask => "MetaMask",
            Self::TrustWallet => "Trust Wallet",
            Self::ImToken => "imToken",
        }
    }

    /// Returns the link opening `domain` inside this app's browser.
    ///
    /// `domain` is a bare host such as `example.com`.
    #[must_use]
    pub fn deep_link(self, domain: &str) -> String {
        match self {
            Self::MetaMask => format!("https://metamask.app.link/dapp/{domain}"),
            Self::TrustWallet => format!(
                "https://link.trustwallet.com/open_url?url={}",
                urlencoding::encode(&format!("https://{domain}"))
            ),
            Self::ImToken => format!(
                "imtokenv2://browserview?url={}",
                urlencoding::encode(&format!("https://{domain}"))
            ),
        }
    }
}

impl fmt::Display for WalletApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// BrowserHost
// ============================================================================

/// The browser runtime hosting the negotiator.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Returns `false` outside a browser context (e.g. server rendering).
    fn is_browser(&self) -> bool;

    /// Returns the user agent string, if any.
    fn user_agent(&self) -> Option<String>;

    /// Returns `true` if a wallet provider is injected into the page.
    fn has_injected_provider(&self) -> bool;

    /// Returns `true` if the runtime can hold a WebSocket open.
    fn supports_persistent_socket(&self) -> bool {
        true
    }

    /// Lists local-storage keys.
    fn storage_keys(&self) -> Vec<String>;

    /// Removes one local-storage key.
    fn remove_storage_key(&self, key: &str);

    /// Navigates to `url`, typically a wallet deep link.
    async fn open_url(&self, url: &str) -> Result<()>;
}

/// Removes stale pairing tokens from the host's local storage.
///
/// Returns the number of keys removed.
pub fn clear_pairing_artifacts(host: &dyn BrowserHost) -> usize {
    let stale: Vec<String> = host
        .storage_keys()
        .into_iter()
        .filter(|key| {
            PAIRING_ARTIFACT_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix))
        })
        .collect();

    for key in &stale {
        host.remove_storage_key(key);
    }

    if !stale.is_empty() {
        debug!(count = stale.len(), "Cleared stale pairing artifacts");
    }
    stale.len()
}

// ============================================================================
// WalletProvider
// ============================================================================

/// The wallet library the negotiator connects through.
///
/// Pairing URIs are generated and consumed by the provider; the bridge only
/// transports them.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Connects through the injected provider and returns the account.
    async fn connect_injected(&self) -> Result<String>;

    /// Starts a pairing and returns its URI.
    async fn create_pairing_uri(&self) -> Result<String>;

    /// Resolves once the counterpart device connects an account.
    async fn await_account(&self) -> Result<String>;

    /// Ends the current wallet session.
    async fn disconnect(&self) -> Result<()>;
}

// ============================================================================
// Helpers
// ============================================================================

/// Shortens an account address for display: `0x1234...abcd`.
///
/// Addresses of ten characters or fewer are returned unchanged.
#[must_use]
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    struct StorageOnly {
        keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BrowserHost for StorageOnly {
        fn is_browser(&self) -> bool {
            true
        }
        fn user_agent(&self) -> Option<String> {
            None
        }
        fn has_injected_provider(&self) -> bool {
            false
        }
        fn storage_keys(&self) -> Vec<String> {
            self.keys.lock().clone()
        }
        fn remove_storage_key(&self, key: &str) {
            self.keys.lock().retain(|k| k != key);
        }
        async fn open_url(&self, _url: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_deep_links() {
        assert_eq!(
            WalletApp::MetaMask.deep_link("javuro.com"),
            "https://metamask.app.link/dapp/javuro.com"
        );
        assert_eq!(
            WalletApp::TrustWallet.deep_link("javuro.com"),
            "https://link.trustwallet.com/open_url?url=https%3A%2F%2Fjavuro.com"
        );
        assert_eq!(
            WalletApp::ImToken.deep_link("javuro.com"),
            "imtokenv2://browserview?url=https%3A%2F%2Fjavuro.com"
        );
    }

    #[test]
    fn test_wallet_display() {
        assert_eq!(WalletApp::TrustWallet.to_string(), "Trust Wallet");
        assert_eq!(WalletApp::ALL.len(), 3);
    }

    #[test]
    fn test_clear_pairing_artifacts() {
        let host = StorageOnly {
            keys: Mutex::new(vec![
                "wc@2:core:pairing".into(),
                "walletconnect".into(),
                "theme".into(),
                "my-wc@key".into(),
            ]),
        };

        assert_eq!(clear_pairing_artifacts(&host), 2);
        assert_eq!(host.storage_keys(), vec!["theme", "my-wc@key"]);
        assert_eq!(clear_pairing_artifacts(&host), 0);
    }

    #[test]
    fn test_format_address() {
        assert_eq!(
            format_address("0x1234567890abcdef1234567890abcdef1234abcd"),
            "0x1234...abcd"
        );
        assert_eq!(format_address("0x12"), "0x12");
        assert_eq!(format_address(""), "");
    }
}
