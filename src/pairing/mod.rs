//! Pairing view: scannable code plus copyable URI.
//!
//! The view follows negotiator events. It opens on
//! [`NegotiatorEvent::PairingStarted`] and closes once the attempt ends.
//! Closing forgets the URI so a stale code is never shown again.
//!
//! | Event | Effect |
//! |-------|--------|
//! | `PairingStarted` | render and show the code |
//! | `Connected` | close |
//! | `Failed` | close |
//! | `Disconnected` | close |

// ============================================================================
// Submodules
// ============================================================================

/// Clipboard access and copy notices.
pub mod clipboard;

/// QR code rendering.
pub mod qr;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::Result;
use crate::negotiator::NegotiatorEvent;

pub use clipboard::{Clipboard, CopyNotice, copy_text};
pub use qr::{PairingCode, QrRenderer};

// ============================================================================
// PairingView
// ============================================================================

/// What is on screen while open.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Displayed {
    uri: String,
    code: PairingCode,
}

/// Presents one pairing URI at a time.
pub struct PairingView {
    renderer: QrRenderer,
    clipboard: Arc<dyn Clipboard>,
    displayed: Option<Displayed>,
    last_error: Option<String>,
}

impl PairingView {
    /// Creates a closed view.
    #[must_use]
    pub fn new(renderer: QrRenderer, clipboard: Arc<dyn Clipboard>) -> Self {
        Self {
            renderer,
            clipboard,
            displayed: None,
            last_error: None,
        }
    }

    /// Returns `true` while a code is shown.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.displayed.is_some()
    }

    /// Returns the displayed URI.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.displayed.as_ref().map(|d| d.uri.as_str())
    }

    /// Returns the displayed code.
    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<&PairingCode> {
        self.displayed.as_ref().map(|d| &d.code)
    }

    /// Returns the terminal rendering error of the last [`open`](Self::open).
    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Renders and shows `uri`, replacing anything shown before.
    ///
    /// # Errors
    ///
    /// Returns the rendering error if neither local nor remote rendering
    /// is possible. The view stays closed in that case.
    pub fn open(&mut self, uri: &str) -> Result<&PairingCode> {
        self.displayed = None;
        self.last_error = None;

        let code = match self.renderer.render(uri) {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "Pairing code unavailable");
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let displayed = self.displayed.insert(Displayed {
            uri: uri.to_string(),
            code,
        });
        debug!(inline = displayed.code.is_inline(), "Pairing view opened");
        Ok(&displayed.code)
    }

    /// Copies the displayed URI. Always yields a notice for the user.
    pub async fn copy_uri(&self) -> CopyNotice {
        match self.uri() {
            Some(uri) => copy_text(self.clipboard.as_ref(), uri).await,
            None => CopyNotice::Failed,
        }
    }

    /// Hides the view and forgets the URI.
    pub fn close(&mut self) {
        if self.displayed.take().is_some() {
            debug!("Pairing view closed");
        }
    }

    /// Applies one negotiator event.
    pub fn handle_event(&mut self, event: &NegotiatorEvent) {
        match event {
            NegotiatorEvent::PairingStarted { uri, .. } => {
                // Failure is recorded in `last_error`.
                let _ = self.open(uri);
            }
            NegotiatorEvent::Connected { .. }
            | NegotiatorEvent::Failed { .. }
            | NegotiatorEvent::Disconnected => self.close(),
            _ => {}
        }
    }

    /// Follows `events` until the attempt ends or the channel closes.
    pub async fn follow(&mut self, mut events: broadcast::Receiver<NegotiatorEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.handle_event(&event);
                    if matches!(
                        event,
                        NegotiatorEvent::Connected { .. }
                            | NegotiatorEvent::Failed { .. }
                            | NegotiatorEvent::Disconnected
                    ) {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Pairing view lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.close();
                    return;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
