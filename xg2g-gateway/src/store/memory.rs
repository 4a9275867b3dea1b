//! In-process store backed by hash maps.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

use super::{expiry_ms, now_ms, Lease, Result, SessionRecord, StateStore, StoreError};

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    leases: HashMap<String, Lease>,
    /// key -> (session ID, expiry in unix ms)
    idempotency: HashMap<String, (String, i64)>,
}

/// Memory-only [`StateStore`]. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn put_session(&self, record: &SessionRecord) -> Result<()> {
        self.inner
            .lock()
            .sessions
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.inner.lock().sessions.get(session_id).cloned())
    }

    fn update_session(
        &self,
        session_id: &str,
        update: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord> {
        let mut inner = self.inner.lock();
        let current = inner
            .sessions
            .get(session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;

        let mut next = current.clone();
        update(&mut next)?;
        inner.sessions.insert(session_id.to_string(), next.clone());
        Ok(next)
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut sessions: Vec<SessionRecord> = self.inner.lock().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    fn try_acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<(Lease, bool)> {
        let now = now_ms();
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.leases.get(key) {
            if existing.owner != owner && !existing.is_expired(now) {
                return Ok((existing.clone(), false));
            }
        }

        let lease = Lease {
            key: key.to_string(),
            owner: owner.to_string(),
            expires_at: expiry_ms(now, ttl),
        };
        inner.leases.insert(key.to_string(), lease.clone());
        Ok((lease, true))
    }

    fn renew_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<Option<Lease>> {
        let now = now_ms();
        let mut inner = self.inner.lock();

        match inner.leases.get_mut(key) {
            Some(lease) if lease.owner == owner && !lease.is_expired(now) => {
                lease.expires_at = expiry_ms(now, ttl);
                Ok(Some(lease.clone()))
            }
            _ => Ok(None),
        }
    }

    fn release_lease(&self, key: &str, owner: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.leases.get(key).map(|l| l.owner == owner).unwrap_or(false) {
            inner.leases.remove(key);
        }
        Ok(())
    }

    fn delete_all_leases(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let count = inner.leases.len();
        inner.leases.clear();
        Ok(count)
    }

    fn get_idempotency(&self, key: &str) -> Result<Option<String>> {
        let now = now_ms();
        let mut inner = self.inner.lock();

        match inner.idempotency.get(key).cloned() {
            Some((session_id, expires_at)) if expires_at > now => Ok(Some(session_id)),
            Some(_) => {
                inner.idempotency.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put_idempotency(&self, key: &str, session_id: &str, ttl: Duration) -> Result<()> {
        let now = now_ms();
        let mut inner = self.inner.lock();
        // Keys that are never looked up again would otherwise stay forever.
        inner.idempotency.retain(|_, (_, expires_at)| *expires_at > now);
        inner
            .idempotency
            .insert(key.to_string(), (session_id.to_string(), expiry_ms(now, ttl)));
        Ok(())
    }
}
