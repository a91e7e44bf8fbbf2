//! Reconnection policy for the persistent-socket client.
//!
//! Fixed backoff with a bounded attempt count. After the last attempt the
//! client stops quietly and pairing continues over other paths.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default number of reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(3);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// How often and how fast to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Attempts after the first drop before giving up.
    pub max_attempts: u32,
    /// Delay before each attempt.
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A policy that never reconnects.
    #[inline]
    #[must_use]
    pub const fn never() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Starts tracking attempts against this policy.
    #[inline]
    #[must_use]
    pub const fn tracker(self) -> ReconnectTracker {
        ReconnectTracker {
            policy: self,
            attempts: 0,
        }
    }
}

// ============================================================================
// ReconnectTracker
// ============================================================================

/// Attempt counter for one client.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectTracker {
    /// Returns the delay before the next attempt, or `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.backoff)
    }

    /// Resets the counter after a successful connection.
    #[inline]
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Returns the attempts made since the last reset.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` if no attempts remain.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================
