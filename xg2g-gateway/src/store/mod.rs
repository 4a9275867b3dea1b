//! State storage for sessions, leases and idempotency records.
//!
//! This module provides the [`StateStore`] contract and two backends:
//! - [`MemoryStore`] for tests and `--memory-store`
//! - [`SqliteStore`] for persistent deployments
//!
//! Expiry is lazy: expired leases are replaced at acquisition time and
//! expired idempotency records are deleted when read. No sweeper runs.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xg2g_protocol::SessionState;

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Illegal session transition {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Context key recording the tuner slot held by a session.
pub const CTX_TUNER_SLOT: &str = "tunerSlot";
/// Context key recording whether the session transcodes.
pub const CTX_TRANSCODE: &str = "transcode";
/// Context key recording the playback mode.
pub const CTX_MODE: &str = "mode";
/// Context key recording the idempotency key that created the session.
pub const CTX_IDEMPOTENCY_KEY: &str = "idempotencyKey";

/// An exclusive, TTL-bounded reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub key: String,
    pub owner: String,
    /// Expiry as unix milliseconds.
    pub expires_at: i64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Persistent record of one accepted intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub service_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub state: SessionState,
    #[serde(rename = "correlationID")]
    pub correlation_id: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl SessionRecord {
    /// Tuner slot recorded in the context.
    pub fn tuner_slot(&self) -> Option<u32> {
        self.context.get(CTX_TUNER_SLOT).and_then(|s| s.parse().ok())
    }

    /// Whether the session was admitted as a transcode.
    pub fn wants_transcode(&self) -> bool {
        self.context.get(CTX_TRANSCODE).map(|v| v == "true").unwrap_or(false)
    }

    /// Move to `next`, enforcing the lifecycle.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: self.state.as_str(),
                to: next.as_str(),
            });
        }
        self.state = next;
        self.updated_at = chrono::Utc::now().timestamp();
        Ok(())
    }
}

/// Storage backend shared by all intent handlers.
///
/// Every method is safe to call concurrently. Implementations keep their
/// critical sections to the storage operation itself.
pub trait StateStore: Send + Sync {
    /// Insert or replace a session record.
    fn put_session(&self, record: &SessionRecord) -> Result<()>;

    /// Load a session record.
    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Read-modify-write a session atomically. Returns the stored record.
    fn update_session(
        &self,
        session_id: &str,
        update: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord>;

    /// All sessions, oldest first.
    fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// Try to take the lease for `key`.
    ///
    /// Succeeds when no lease exists, the existing lease expired, or it is
    /// already held by `owner` (which renews it). On failure the current
    /// holder's lease is returned with `false`.
    fn try_acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<(Lease, bool)>;

    /// Extend a held lease. `None` when the lease was lost.
    fn renew_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<Option<Lease>>;

    /// Drop the lease if `owner` holds it. No-op otherwise.
    fn release_lease(&self, key: &str, owner: &str) -> Result<()>;

    /// Drop every lease. Used once at startup.
    fn delete_all_leases(&self) -> Result<usize>;

    /// Session ID for an unexpired idempotency key.
    fn get_idempotency(&self, key: &str) -> Result<Option<String>>;

    /// Remember `key -> session_id` for `ttl`.
    fn put_idempotency(&self, key: &str, session_id: &str, ttl: Duration) -> Result<()>;
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn expiry_ms(now_ms: i64, ttl: Duration) -> i64 {
    now_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every backend must share.

    use super::*;

    pub fn sample_session(id: &str) -> SessionRecord {
        let now = chrono::Utc::now().timestamp();
        SessionRecord {
            session_id: id.to_string(),
            service_ref: "1:0:19:283D:3FB:1:C00000:0:0:0:".to_string(),
            profile: Some("safari".to_string()),
            state: SessionState::Starting,
            correlation_id: "corr-1".to_string(),
            created_at: now,
            updated_at: now,
            context: BTreeMap::from([(CTX_TUNER_SLOT.to_string(), "1".to_string())]),
        }
    }

    pub fn sessions(store: &dyn StateStore) {
        assert!(store.get_session("s1").unwrap().is_none());

        store.put_session(&sample_session("s1")).unwrap();
        store.put_session(&sample_session("s2")).unwrap();
        let loaded = store.get_session("s1").unwrap().unwrap();
        assert_eq!(loaded, sample_session_with_times("s1", &loaded));
        assert_eq!(loaded.tuner_slot(), Some(1));
        assert_eq!(store.list_sessions().unwrap().len(), 2);

        let updated = store
            .update_session("s1", &mut |rec: &mut SessionRecord| rec.transition(SessionState::Ready))
            .unwrap();
        assert_eq!(updated.state, SessionState::Ready);
        assert_eq!(store.get_session("s1").unwrap().unwrap().state, SessionState::Ready);

        let err = store
            .update_session("s1", &mut |rec: &mut SessionRecord| rec.transition(SessionState::Starting))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.get_session("s1").unwrap().unwrap().state, SessionState::Ready);

        let err = store.update_session("nope", &mut |_: &mut SessionRecord| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(_)));
    }

    fn sample_session_with_times(id: &str, loaded: &SessionRecord) -> SessionRecord {
        let mut expected = sample_session(id);
        expected.created_at = loaded.created_at;
        expected.updated_at = loaded.updated_at;
        expected
    }

    pub fn leases(store: &dyn StateStore) {
        let ttl = Duration::from_secs(30);

        let (lease, acquired) = store.try_acquire_lease("tuner:0", "a", ttl).unwrap();
        assert!(acquired);
        assert_eq!(lease.owner, "a");

        let (holder, acquired) = store.try_acquire_lease("tuner:0", "b", ttl).unwrap();
        assert!(!acquired);
        assert_eq!(holder.owner, "a");

        // Re-entry by the holder renews.
        let (_, acquired) = store.try_acquire_lease("tuner:0", "a", ttl).unwrap();
        assert!(acquired);

        // Release by a stranger is ignored.
        store.release_lease("tuner:0", "b").unwrap();
        assert!(!store.try_acquire_lease("tuner:0", "b", ttl).unwrap().1);

        assert!(store.renew_lease("tuner:0", "a", ttl).unwrap().is_some());
        assert!(store.renew_lease("tuner:0", "b", ttl).unwrap().is_none());

        store.release_lease("tuner:0", "a").unwrap();
        assert!(store.renew_lease("tuner:0", "a", ttl).unwrap().is_none());
        assert!(store.try_acquire_lease("tuner:0", "b", ttl).unwrap().1);
    }

    pub fn lease_expiry(store: &dyn StateStore) {
        let (_, acquired) = store.try_acquire_lease("service:x", "a", Duration::ZERO).unwrap();
        assert!(acquired);

        // Expired leases are taken over lazily.
        let (lease, acquired) = store
            .try_acquire_lease("service:x", "b", Duration::from_secs(30))
            .unwrap();
        assert!(acquired);
        assert_eq!(lease.owner, "b");
        assert!(store.renew_lease("service:x", "a", Duration::from_secs(30)).unwrap().is_none());
    }

    pub fn delete_all(store: &dyn StateStore) {
        let ttl = Duration::from_secs(30);
        store.try_acquire_lease("tuner:0", "a", ttl).unwrap();
        store.try_acquire_lease("tuner:1", "b", ttl).unwrap();
        assert_eq!(store.delete_all_leases().unwrap(), 2);
        assert!(store.try_acquire_lease("tuner:0", "c", ttl).unwrap().1);
    }

    pub fn idempotency(store: &dyn StateStore) {
        assert_eq!(store.get_idempotency("k").unwrap(), None);

        store.put_idempotency("k", "s1", Duration::from_secs(300)).unwrap();
        assert_eq!(store.get_idempotency("k").unwrap().as_deref(), Some("s1"));

        store.put_idempotency("gone", "s2", Duration::ZERO).unwrap();
        assert_eq!(store.get_idempotency("gone").unwrap(), None);
        assert_eq!(store.get_idempotency("gone").unwrap(), None);
    }
}
