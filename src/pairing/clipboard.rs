//! Copy-to-clipboard with a guaranteed user notice.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

// ============================================================================
// Clipboard
// ============================================================================

/// Clipboard access of the host runtime.
#[async_trait]
pub trait Clipboard: Send + Sync {
    /// Returns `true` if the asynchronous clipboard API is available.
    fn is_secure_context(&self) -> bool;

    /// Writes through the asynchronous clipboard API.
    async fn write_text(&self, text: &str) -> Result<()>;

    /// Copies by selecting a hidden text field. Returns `true` on success.
    fn copy_via_selection(&self, text: &str) -> bool;
}

// ============================================================================
// CopyNotice
// ============================================================================

/// Outcome shown to the user after a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyNotice {
    /// The URI is on the clipboard.
    Copied,
    /// Copying failed; the user must copy by hand.
    Failed,
}

impl CopyNotice {
    /// Returns the notice text.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Copied => "Copied! Paste it into your wallet app.",
            Self::Failed => "Copy failed. Please copy the URI manually.",
        }
    }
}

impl fmt::Display for CopyNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Copies `text` and reports the outcome.
///
/// Secure contexts use the clipboard API; others fall back to selection.
pub async fn copy_text(clipboard: &dyn Clipboard, text: &str) -> CopyNotice {
    let copied = if clipboard.is_secure_context() {
        match clipboard.write_text(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Clipboard write failed");
                false
            }
        }
    } else {
        debug!("Insecure context, copying via selection");
        clipboard.copy_via_selection(text)
    };

    if copied {
        CopyNotice::Copied
    } else {
        CopyNotice::Failed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::error::Error;

    #[derive(Default)]
    struct FakeClipboard {
        secure: bool,
        write_fails: bool,
        selection_works: bool,
        contents: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Clipboard for FakeClipboard {
        fn is_secure_context(&self) -> bool {
            self.secure
        }

        async fn write_text(&self, text: &str) -> Result<()> {
            if self.write_fails {
                return Err(Error::user_rejected("clipboard permission denied"));
            }
            *self.contents.lock() = Some(text.to_string());
            Ok(())
        }

        fn copy_via_selection(&self, text: &str) -> bool {
            if self.selection_works {
                *self.contents.lock() = Some(text.to_string());
            }
            self.selection_works
        }
    }

    #[tokio::test]
    async fn test_secure_context_copy() {
        let clipboard = FakeClipboard {
            secure: true,
            ..FakeClipboard::default()
        };
        assert_eq!(copy_text(&clipboard, "wc:a@2").await, CopyNotice::Copied);
        assert_eq!(clipboard.contents.lock().as_deref(), Some("wc:a@2"));
    }

    #[tokio::test]
    async fn test_secure_context_failure() {
        let clipboard = FakeClipboard {
            secure: true,
            write_fails: true,
            selection_works: true,
            ..FakeClipboard::default()
        };
        assert_eq!(copy_text(&clipboard, "wc:a@2").await, CopyNotice::Failed);
    }

    #[tokio::test]
    async fn test_selection_fallback() {
        let clipboard = FakeClipboard {
            selection_works: true,
            ..FakeClipboard::default()
        };
        assert_eq!(copy_text(&clipboard, "wc:b@2").await, CopyNotice::Copied);

        let broken = FakeClipboard::default();
        assert_eq!(copy_text(&broken, "wc:b@2").await, CopyNotice::Failed);
    }

    #[test]
    fn test_notice_messages() {
        assert_eq!(
            CopyNotice::Copied.to_string(),
            "Copied! Paste it into your wallet app."
        );
        assert_eq!(
            CopyNotice::Failed.message(),
            "Copy failed. Please copy the URI manually."
        );
    }
}
