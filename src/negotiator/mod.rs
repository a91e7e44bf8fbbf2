//! Client-side connection negotiator.
//!
//! Picks a connection path for the current runtime and walks it until an
//! account is connected or every path is exhausted.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Detecting ──► SelectingTransport ──► AwaitingPairing ──► Connected
//!  ▲                             │                     │
//!  │                             └────────┬────────────┘
//!  │                                      ▼
//!  └───────────── reset() ─────────────  Failed{reason}
//! ```
//!
//! # Policy
//!
//! | Runtime | Steps, in order |
//! |---------|-----------------|
//! | desktop, injected provider | injected, pairing |
//! | desktop, no provider | pairing |
//! | mobile, preferred wallet | deep link, pairing |
//! | mobile, no preference | picker offered, pairing |
//!
//! Safari is treated like mobile for the injected step.

// ============================================================================
// Submodules
// ============================================================================

/// User agent and provider detection.
pub mod detect;

/// Wallet apps and host capabilities.
pub mod wallet;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, FailureReason, Result};
use crate::transport::{BridgeEndpoints, ReconnectPolicy, Registration, Transport};

pub use detect::DeviceProfile;
pub use wallet::{BrowserHost, WalletApp, WalletProvider, clear_pairing_artifacts, format_address};

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for the counterpart device.
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default application domain opened by wallet deep links.
pub const DEFAULT_APP_DOMAIN: &str = "javuro.com";

/// Capacity of the event channel.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// NegotiatorConfig
// ============================================================================

/// Client-side negotiator settings.
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Where the bridge is reachable.
    pub endpoints: BridgeEndpoints,
    /// How long to wait in `AwaitingPairing`.
    pub pairing_timeout: Duration,
    /// Domain opened inside wallet apps on mobile.
    pub app_domain: String,
    /// Wallet app to hand off to on mobile.
    pub preferred_wallet: Option<WalletApp>,
    /// Required prefix of pairing URIs.
    pub uri_scheme: String,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            endpoints: BridgeEndpoints::default(),
            pairing_timeout: DEFAULT_PAIRING_TIMEOUT,
            app_domain: DEFAULT_APP_DOMAIN.to_string(),
            preferred_wallet: None,
            uri_scheme: crate::config::DEFAULT_URI_SCHEME.to_string(),
        }
    }
}

impl NegotiatorConfig {
    /// Creates the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relay WebSocket URL.
    #[must_use]
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.socket_url = Some(url.into());
        self
    }

    /// Sets the HTTP facade base URL.
    #[must_use]
    pub fn with_facade_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.facade_url = Some(url.into());
        self
    }

    /// Sets the socket reconnection policy.
    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.endpoints.reconnect = policy;
        self
    }

    /// Sets the pairing timeout.
    #[must_use]
    pub fn with_pairing_timeout(mut self, timeout: Duration) -> Self {
        self.pairing_timeout = timeout;
        self
    }

    /// Sets the domain opened by deep links.
    #[must_use]
    pub fn with_app_domain(mut self, domain: impl Into<String>) -> Self {
        self.app_domain = domain.into();
        self
    }

    /// Sets the wallet app preferred on mobile.
    #[must_use]
    pub fn with_preferred_wallet(mut self, wallet: WalletApp) -> Self {
        self.preferred_wallet = Some(wallet);
        self
    }

    /// Sets the required pairing URI prefix.
    #[must_use]
    pub fn with_uri_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.uri_scheme = scheme.into();
        self
    }
}

// ============================================================================
// NegotiatorState
// ============================================================================

/// Where a connection attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiatorState {
    /// No attempt running.
    Idle,
    /// Inspecting the runtime.
    Detecting,
    /// Walking the policy table.
    SelectingTransport,
    /// Waiting for the counterpart device.
    AwaitingPairing,
    /// An account is connected.
    Connected {
        /// Connected account address.
        account: String,
    },
    /// The attempt failed. Call [`Negotiator::reset`] or connect again.
    Failed {
        /// Failure category.
        reason: FailureReason,
        /// Message to show the user.
        message: String,
    },
}

impl NegotiatorState {
    /// Returns the state name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detecting => "detecting",
            Self::SelectingTransport => "selecting_transport",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Connected { .. } => "connected",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for NegotiatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// NegotiatorEvent
// ============================================================================

/// Notifications for the pairing view and other observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiatorEvent {
    /// The state changed.
    StateChanged(NegotiatorState),
    /// The user should pick a wallet app.
    PickerOffered {
        /// Apps to offer.
        apps: Vec<WalletApp>,
    },
    /// A wallet deep link was opened.
    DeepLinkOpened {
        /// Target app.
        app: WalletApp,
        /// Opened link.
        url: String,
    },
    /// A pairing URI is ready to display.
    PairingStarted {
        /// The pairing URI.
        uri: String,
        /// Where the bridge stored it.
        registration: Registration,
    },
    /// An account connected.
    Connected {
        /// Account address.
        account: String,
    },
    /// The attempt failed.
    Failed {
        /// Failure category.
        reason: FailureReason,
        /// Message to show the user.
        message: String,
    },
    /// The wallet session was ended.
    Disconnected,
}

// ============================================================================
// Policy
// ============================================================================

/// One step of the connection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStep {
    /// Connect through the injected provider.
    Injected,
    /// Open a wallet app by deep link.
    DeepLink(WalletApp),
    /// Offer the wallet picker.
    OfferPicker,
    /// Register a pairing URI and show the pairing view.
    Pairing,
}

/// Returns the steps to try for `profile`, in order.
///
/// Pairing is always last so a code can be scanned when nothing else works.
#[must_use]
pub fn plan(profile: &DeviceProfile, preferred: Option<WalletApp>) -> Vec<PolicyStep> {
    let mut steps = Vec::with_capacity(3);

    if profile.injected_provider && !profile.is_constrained() {
        steps.push(PolicyStep::Injected);
    }

    if profile.mobile {
        steps.push(match preferred {
            Some(app) => PolicyStep::DeepLink(app),
            None => PolicyStep::OfferPicker,
        });
    }

    steps.push(PolicyStep::Pairing);
    steps
}

// ============================================================================
// Negotiator
// ============================================================================

#[derive(Clone)]
struct Transports {
    primary: Arc<dyn Transport>,
    fallback: Option<Arc<dyn Transport>>,
}

/// Drives one wallet connection at a time.
///
/// # Example
///
/// ```ignore
/// let negotiator = Negotiator::new(
///     NegotiatorConfig::new().with_facade_url("https://example.com/wallet-connect"),
///     host,
///     provider,
/// );
/// let mut events = negotiator.subscribe();
/// let account = negotiator.connect().await?;
/// ```
pub struct Negotiator {
    config: NegotiatorConfig,
    host: Arc<dyn BrowserHost>,
    provider: Arc<dyn WalletProvider>,

    /// Selected on the first attempt.
    transports: Mutex<Option<Transports>>,

    state: Mutex<NegotiatorState>,
    events: broadcast::Sender<NegotiatorEvent>,

    /// Bumped by [`Negotiator::cancel`].
    cancel_tx: watch::Sender<u64>,

    /// Held for the duration of an attempt.
    attempt_lock: tokio::sync::Mutex<()>,
}

// ============================================================================
// Negotiator - Constructor
// ============================================================================

impl Negotiator {
    /// Creates a negotiator. Transports are selected on the first attempt.
    #[must_use]
    pub fn new(
        config: NegotiatorConfig,
        host: Arc<dyn BrowserHost>,
        provider: Arc<dyn WalletProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (cancel_tx, _) = watch::channel(0);

        Self {
            config,
            host,
            provider,
            transports: Mutex::new(None),
            state: Mutex::new(NegotiatorState::Idle),
            events,
            cancel_tx,
            attempt_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Uses the given transports instead of selecting them from the config.
    #[must_use]
    pub fn with_transport(
        self,
        primary: Arc<dyn Transport>,
        fallback: Option<Arc<dyn Transport>>,
    ) -> Self {
        *self.transports.lock() = Some(Transports { primary, fallback });
        self
    }
}

// ============================================================================
// Negotiator - Public API
// ============================================================================

impl Negotiator {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> NegotiatorState {
        self.state.lock().clone()
    }

    /// Returns the connected account, if any.
    #[must_use]
    pub fn account(&self) -> Option<String> {
        match &*self.state.lock() {
            NegotiatorState::Connected { account } => Some(account.clone()),
            _ => None,
        }
    }

    /// Subscribes to negotiator events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NegotiatorEvent> {
        self.events.subscribe()
    }

    /// Runs one connection attempt.
    ///
    /// Stale pairing artifacts are cleared first. On failure the state is
    /// [`NegotiatorState::Failed`] and the error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] outside a browser or without bridge endpoints
    /// - [`Error::UserRejected`] if cancelled or rejected
    /// - [`Error::Timeout`] if the counterpart never connects
    /// - a connection error if no transport reaches the bridge
    pub async fn connect(&self) -> Result<String> {
        let Ok(_attempt) = self.attempt_lock.try_lock() else {
            return Err(Error::protocol("a connection attempt is already running"));
        };

        if let Some(account) = self.account() {
            return Ok(account);
        }

        let mut cancel_rx = self.cancel_tx.subscribe();
        cancel_rx.mark_unchanged();

        self.transition(NegotiatorState::Detecting);
        clear_pairing_artifacts(self.host.as_ref());

        match self.attempt(&mut cancel_rx).await {
            Ok(account) => {
                info!(account = %format_address(&account), "Wallet connected");
                self.transition(NegotiatorState::Connected {
                    account: account.clone(),
                });
                self.emit(NegotiatorEvent::Connected {
                    account: account.clone(),
                });
                Ok(account)
            }
            Err(e) => {
                let reason = e.failure_reason();
                let message = reason.user_message().to_string();
                warn!(error = %e, %reason, "Wallet connection failed");
                self.transition(NegotiatorState::Failed {
                    reason,
                    message: message.clone(),
                });
                self.emit(NegotiatorEvent::Failed { reason, message });
                Err(e)
            }
        }
    }

    /// Cancels a running attempt. The attempt fails as user-rejected.
    pub fn cancel(&self) {
        self.cancel_tx.send_modify(|generation| *generation += 1);
    }

    /// Returns a failed negotiator to idle so the user can retry.
    ///
    /// Returns `false` if the state was not `Failed`.
    pub fn reset(&self) -> bool {
        let failed = matches!(*self.state.lock(), NegotiatorState::Failed { .. });
        if failed {
            self.transition(NegotiatorState::Idle);
        }
        failed
    }

    /// Ends the wallet session and closes the transports.
    pub async fn disconnect(&self) {
        if let Err(e) = self.provider.disconnect().await {
            warn!(error = %e, "Provider disconnect failed");
        }
        clear_pairing_artifacts(self.host.as_ref());

        let transports = self.transports.lock().take();
        if let Some(transports) = transports {
            transports.primary.close().await;
            if let Some(fallback) = transports.fallback {
                fallback.close().await;
            }
        }

        self.transition(NegotiatorState::Idle);
        self.emit(NegotiatorEvent::Disconnected);
    }
}

// ============================================================================
// Negotiator - Attempt
// ============================================================================

impl Negotiator {
    async fn attempt(&self, cancel_rx: &mut watch::Receiver<u64>) -> Result<String> {
        if !self.host.is_browser() {
            return Err(Error::config(
                "wallet connection requires a browser context",
            ));
        }

        let user_agent = self.host.user_agent();
        let profile =
            DeviceProfile::detect(user_agent.as_deref(), self.host.has_injected_provider());
        debug!(?profile, "Runtime detected");

        self.transition(NegotiatorState::SelectingTransport);

        let mut last_error = None;

        for step in plan(&profile, self.config.preferred_wallet) {
            debug!(?step, "Trying connection step");

            match step {
                PolicyStep::Injected => match self.provider.connect_injected().await {
                    Ok(account) => return Ok(account),
                    Err(e) => {
                        info!(error = %e, "Injected provider failed, falling back");
                        last_error = Some(e);
                    }
                },

                PolicyStep::DeepLink(app) => {
                    let url = app.deep_link(&self.config.app_domain);
                    match self.host.open_url(&url).await {
                        Ok(()) => {
                            self.emit(NegotiatorEvent::DeepLinkOpened { app, url });
                            match self.await_account(cancel_rx).await {
                                Ok(account) => return Ok(account),
                                Err(e @ Error::UserRejected { .. }) => return Err(e),
                                Err(e) => {
                                    info!(error = %e, %app, "Deep link handoff failed");
                                    last_error = Some(e);
                                }
                            }
                        }
                        Err(e) => {
                            info!(error = %e, %app, "Deep link could not be opened");
                            last_error = Some(e);
                        }
                    }
                }

                PolicyStep::OfferPicker => {
                    self.emit(NegotiatorEvent::PickerOffered {
                        apps: WalletApp::ALL.to_vec(),
                    });
                }

                PolicyStep::Pairing => return self.pair(cancel_rx).await,
            }
        }

        Err(last_error.unwrap_or_else(|| Error::config("no connection path available")))
    }

    /// Registers a fresh pairing URI and waits for the counterpart.
    async fn pair(&self, cancel_rx: &mut watch::Receiver<u64>) -> Result<String> {
        let uri = self.provider.create_pairing_uri().await?;
        if !uri.starts_with(&self.config.uri_scheme) {
            return Err(Error::invalid_uri(format!(
                "Invalid URI format: expected '{}' prefix",
                self.config.uri_scheme
            )));
        }

        let registration = self.register(&uri).await?;
        debug!(session_id = %registration.session_id, "Pairing URI registered");

        self.emit(NegotiatorEvent::PairingStarted { uri, registration });
        self.await_account(cancel_rx).await
    }

    async fn register(&self, uri: &str) -> Result<Registration> {
        let transports = self.transports()?;

        match transports.primary.register_uri(uri).await {
            Ok(registration) => Ok(registration),
            Err(e) if e.is_connection_error() => match &transports.fallback {
                Some(fallback) => {
                    info!(
                        error = %e,
                        primary = %transports.primary.kind(),
                        fallback = %fallback.kind(),
                        "Primary transport unavailable, using fallback"
                    );
                    fallback.register_uri(uri).await
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn await_account(&self, cancel_rx: &mut watch::Receiver<u64>) -> Result<String> {
        self.transition(NegotiatorState::AwaitingPairing);

        let timeout = self.config.pairing_timeout;
        tokio::select! {
            account = self.provider.await_account() => account,
            () = tokio::time::sleep(timeout) => Err(Error::timeout(
                "pairing",
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
            _ = cancel_rx.changed() => Err(Error::user_rejected("pairing cancelled")),
        }
    }

    fn transports(&self) -> Result<Transports> {
        let mut guard = self.transports.lock();
        if let Some(transports) = guard.as_ref() {
            return Ok(transports.clone());
        }

        let primary = self
            .config
            .endpoints
            .select(self.host.supports_persistent_socket())?;
        let fallback = self.config.endpoints.fallback_for(primary.kind())?;
        info!(transport = %primary.kind(), "Transport selected");

        let transports = Transports { primary, fallback };
        *guard = Some(transports.clone());
        Ok(transports)
    }

    fn transition(&self, next: NegotiatorState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next.clone());
        debug!(from = %previous, to = %next, "Negotiator state changed");
        self.emit(NegotiatorEvent::StateChanged(next));
    }

    fn emit(&self, event: NegotiatorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ============================================================================
// Tests
// ============================================================================
