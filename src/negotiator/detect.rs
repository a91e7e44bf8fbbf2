//! Runtime environment detection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

// ============================================================================
// Patterns
// ============================================================================

static MOBILE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini").ok()
});

static SAFARI_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)safari").ok());

static CHROME_OR_ANDROID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)chrome|android").ok());

fn matches(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

// ============================================================================
// DeviceProfile
// ============================================================================

/// What the negotiator learned about the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Mobile user agent.
    pub mobile: bool,
    /// Safari engine without Chrome or Android in the user agent.
    pub safari: bool,
    /// A wallet provider is injected into the page.
    pub injected_provider: bool,
}

impl DeviceProfile {
    /// Classifies a runtime from its user agent and provider presence.
    #[must_use]
    pub fn detect(user_agent: Option<&str>, injected_provider: bool) -> Self {
        let user_agent = user_agent.unwrap_or_default();
        Self {
            mobile: is_mobile(user_agent),
            safari: is_safari(user_agent),
            injected_provider,
        }
    }

    /// Returns `true` if the injected provider should not be tried first.
    #[inline]
    #[must_use]
    pub fn is_constrained(&self) -> bool {
        self.mobile || self.safari
    }
}

/// Returns `true` for mobile user agents.
#[must_use]
pub fn is_mobile(user_agent: &str) -> bool {
    matches(&MOBILE_PATTERN, user_agent)
}

/// Returns `true` for Safari that is not Chrome or Android.
///
/// Chrome and Android browsers advertise `Safari` too, so any user agent
/// mentioning them is excluded.
#[must_use]
pub fn is_safari(user_agent: &str) -> bool {
    let Some(pos) = SAFARI_PATTERN
        .as_ref()
        .and_then(|re| re.find(user_agent))
        .map(|m| m.start())
    else {
        return false;
    };
    !matches(&CHROME_OR_ANDROID_PATTERN, &user_agent[..pos])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36";
    const MAC_SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
    const MAC_CHROME: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
    const LINUX_FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";

    #[test]
    fn test_patterns_compile() {
        assert!(MOBILE_PATTERN.is_some());
        assert!(SAFARI_PATTERN.is_some());
        assert!(CHROME_OR_ANDROID_PATTERN.is_some());
    }

    #[test]
    fn test_mobile_detection() {
        assert!(is_mobile(IPHONE));
        assert!(is_mobile(ANDROID_CHROME));
        assert!(is_mobile("opera mini/8.0"));
        assert!(!is_mobile(MAC_SAFARI));
        assert!(!is_mobile(LINUX_FIREFOX));
    }

    #[test]
    fn test_safari_detection() {
        assert!(is_safari(MAC_SAFARI));
        assert!(is_safari(IPHONE));
        assert!(!is_safari(MAC_CHROME));
        assert!(!is_safari(ANDROID_CHROME));
        assert!(!is_safari(LINUX_FIREFOX));
    }

    #[test]
    fn test_profile() {
        let desktop = DeviceProfile::detect(Some(LINUX_FIREFOX), true);
        assert!(!desktop.is_constrained());
        assert!(desktop.injected_provider);

        let safari = DeviceProfile::detect(Some(MAC_SAFARI), true);
        assert!(safari.is_constrained());

        let unknown = DeviceProfile::detect(None, false);
        assert_eq!(unknown, DeviceProfile::default());
    }
}
