//! In-memory pairing session store.
//!
//! Sessions map an opaque [`SessionId`] to a pairing URI. They live for a
//! fixed TTL and are never persisted: a restart drops every session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              SessionStore                │
//! │  ┌────────────────────────────────────┐  │
//! │  │ SessionId → PairingSession         │  │
//! │  │   (uri, created_at, status)        │  │
//! │  └────────────────────────────────────┘  │
//! └──────▲──────────────────────▲────────────┘
//!        │                      │
//!   socket relay           HTTP facade
//! ```
//!
//! Expired entries are evicted lazily on [`SessionStore::get`] and by the
//! periodic sweep the bridge runs.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::DEFAULT_SESSION_TTL_SECS;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;

// ============================================================================
// SessionStatus
// ============================================================================

/// Lifecycle status of a pairing session.
///
/// `Consumed` is informational: the bridge relays URIs and never observes
/// the wallet handshake itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Waiting for the counterpart device.
    Active,
    /// Counterpart completed the handshake.
    Consumed,
    /// Past its TTL.
    Expired,
}

// ============================================================================
// PairingSession
// ============================================================================

/// A registered pairing URI.
///
/// The URI is immutable after creation.
#[derive(Debug, Clone)]
pub struct PairingSession {
    id: SessionId,
    uri: Arc<str>,
    created_at: Instant,
    expires_at: Instant,
    status: SessionStatus,
}

impl PairingSession {
    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the pairing URI exactly as registered.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns when the session was created.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns when the session stops being served.
    #[inline]
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns the status as of `now`.
    #[must_use]
    pub fn status_at(&self, now: Instant) -> SessionStatus {
        if self.is_expired_at(now) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// Thread-safe store of pairing sessions.
///
/// Constructed once per process and shared via `Arc` with the socket relay
/// and the HTTP facade. Tests use a fresh instance each.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<FxHashMap<SessionId, PairingSession>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

impl SessionStore {
    /// Creates an empty store with the given session lifetime.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the session lifetime.
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the number of stored sessions, expired ones included until
    /// they are evicted.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no sessions are stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Stores a new active session for `uri` and returns it.
    ///
    /// The id is regenerated on the (improbable) collision with a live
    /// entry, so no two sessions ever share an id.
    pub fn create(&self, uri: impl Into<Arc<str>>) -> PairingSession {
        let uri = uri.into();
        let created_at = Instant::now();

        let mut sessions = self.sessions.write();
        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        let session = PairingSession {
            id: id.clone(),
            uri,
            created_at,
            expires_at: created_at + self.ttl,
            status: SessionStatus::Active,
        };
        sessions.insert(id, session.clone());
        drop(sessions);

        debug!(session_id = %session.id, "Pairing session created");
        session
    }

    /// Fetches a live session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the id is unknown or expired.
    /// Expired entries are removed.
    pub fn get(&self, session_id: &str) -> Result<PairingSession> {
        self.get_at(session_id, Instant::now())
    }

    pub(crate) fn get_at(&self, session_id: &str, now: Instant) -> Result<PairingSession> {
        {
            let sessions = self.sessions.read();
            match sessions.get(session_id) {
                None => return Err(Error::session_not_found(session_id)),
                Some(session) if !session.is_expired_at(now) => return Ok(session.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; another task may have evicted it.
        let mut sessions = self.sessions.write();
        if sessions
            .get(session_id)
            .is_some_and(|session| session.is_expired_at(now))
        {
            sessions.remove(session_id);
            trace!(session_id, "Expired session evicted on lookup");
        }

        Err(Error::session_not_found(session_id))
    }

    /// Drops a session when its owning connection closes.
    pub(crate) fn release(&self, session_id: &SessionId) -> Option<PairingSession> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_some() {
            debug!(session_id = %session_id, "Pairing session released");
        }
        removed
    }

    /// Removes every session past its TTL. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        before - sessions.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use proptest::prelude::*;
    use rustc_hash::FxHashSet;
    use tokio_test::{assert_err, assert_ok};

    const EPSILON: Duration = Duration::from_millis(1);

    #[test]
    fn test_create_then_get() {
        let store = SessionStore::default();
        let session = store.create("wc:abc@2?x=1");

        let fetched = store.get(session.id().as_str()).expect("session present");
        assert_eq!(fetched.uri(), "wc:abc@2?x=1");
        assert_eq!(fetched.status_at(Instant::now()), SessionStatus::Active);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_unknown() {
        let store = SessionStore::default();
        let err = store.get("doesnotexist").unwrap_err();
        assert!(matches!(err, Error::SessionNotFound { .. }));
    }

    #[test]
    fn test_expired_session_not_returned() {
        let store = SessionStore::new(Duration::from_secs(30 * 60));
        let session = store.create("wc:expiring@2");

        let later = session.created_at() + store.ttl() + EPSILON;
        let result = store.get_at(session.id().as_str(), later);

        assert!(matches!(result, Err(Error::SessionNotFound { .. })));
        assert!(store.is_empty(), "expired entry should be evicted");
    }

    #[test]
    fn test_session_live_just_before_ttl() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.create("wc:live@2");

        let almost = session.created_at() + store.ttl() - EPSILON;
        let fetched = assert_ok!(store.get_at(session.id().as_str(), almost));
        assert_eq!(fetched.id(), session.id());
    }

    #[test]
    fn test_status_at_reports_expired() {
        let store = SessionStore::new(Duration::from_secs(1));
        let session = store.create("wc:s@2");
        assert_eq!(
            session.status_at(session.expires_at()),
            SessionStatus::Expired
        );
    }

    #[test]
    fn test_release() {
        let store = SessionStore::default();
        let session = store.create("wc:r@2");

        assert!(store.release(session.id()).is_some());
        assert!(store.release(session.id()).is_none());
        assert_err!(store.get(session.id().as_str()));
    }

    #[test]
    fn test_purge_keeps_live_sessions() {
        let store = SessionStore::new(Duration::from_secs(10));
        let session = store.create("wc:live@2");

        assert_eq!(store.purge_expired_at(session.created_at()), 0);
        assert!(store.get(session.id().as_str()).is_ok());
    }

    #[test]
    fn test_purge_expired_all() {
        let store = SessionStore::new(Duration::from_secs(10));
        let a = store.create("wc:a@2");
        store.create("wc:b@2");

        let removed = store.purge_expired_at(a.created_at() + Duration::from_secs(3600));
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_creates_unique() {
        let store = Arc::new(SessionStore::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..250)
                        .map(|i| store.create(format!("wc:{i}@2")).id().clone())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: FxHashSet<_> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        assert_eq!(ids.len(), 2000);
        assert_eq!(store.len(), 2000);
    }

    proptest! {
        #[test]
        fn prop_uri_is_preserved(uri in ".*") {
            let store = SessionStore::default();
            let session = store.create(uri.as_str());
            let fetched = store.get(session.id().as_str()).unwrap();
            prop_assert_eq!(fetched.uri(), uri.as_str());
        }

        #[test]
        fn prop_ids_pairwise_distinct(n in 1usize..200) {
            let store = SessionStore::default();
            let ids: FxHashSet<_> = (0..n).map(|_| store.create("wc:p@2").id().clone()).collect();
            prop_assert_eq!(ids.len(), n);
        }
    }
}
