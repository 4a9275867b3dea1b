//! Lease management for tuner slots and per-service deduplication.
//!
//! Two kinds of keys are used:
//! - `service:<ref>`: at most one starting or running session per channel
//! - `tuner:<slot>`: one session per configured tuner slot
//!
//! All acquisitions are non-blocking. A busy key is reported to the caller
//! immediately, never waited on.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use crate::store::{Lease, StateStore, StoreError};

/// Lease-related errors.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Another owner holds the key.
    #[error("Lease {key} is held by another session")]
    Busy { key: String, holder: String },

    /// Every configured tuner slot is taken.
    #[error("All {slots} tuner slots are busy")]
    NoTunerAvailable { slots: usize },

    /// Storage failed.
    #[error("Lease store error: {0}")]
    Store(#[from] StoreError),
}

/// Dedup key for a receiver service reference.
pub fn service_key(service_ref: &str) -> String {
    format!("service:{}", service_ref)
}

/// Reservation key for a tuner slot index.
pub fn tuner_key(slot: u32) -> String {
    format!("tuner:{}", slot)
}

/// Leases held by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub owner: String,
    pub keys: Vec<String>,
    pub tuner_slot: Option<u32>,
}

impl Reservation {
    /// Reservation for an already persisted session.
    pub fn for_session(owner: &str, service_ref: &str, tuner_slot: Option<u32>) -> Self {
        let mut keys = vec![service_key(service_ref)];
        keys.extend(tuner_slot.map(tuner_key));
        Self {
            owner: owner.to_string(),
            keys,
            tuner_slot,
        }
    }
}

/// TTL-bounded reservations and idempotency mapping on top of a [`StateStore`].
pub struct LeaseManager {
    store: Arc<dyn StateStore>,
    lease_ttl: Duration,
    idempotency_ttl: Duration,
}

impl LeaseManager {
    /// Create a new lease manager.
    pub fn new(store: Arc<dyn StateStore>, lease_ttl: Duration, idempotency_ttl: Duration) -> Self {
        Self {
            store,
            lease_ttl,
            idempotency_ttl,
        }
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Try to take `key` for `owner` without waiting.
    pub fn try_acquire(&self, key: &str, owner: &str) -> Result<(Lease, bool), StoreError> {
        self.store.try_acquire_lease(key, owner, self.lease_ttl)
    }

    /// Release `key` if `owner` still holds it.
    pub fn release(&self, key: &str, owner: &str) -> Result<(), StoreError> {
        self.store.release_lease(key, owner)
    }

    /// Session previously created for an idempotency key.
    pub fn get_idempotency(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.get_idempotency(key)
    }

    /// Remember the session created for an idempotency key.
    pub fn put_idempotency(&self, key: &str, session_id: &str) -> Result<(), StoreError> {
        self.store.put_idempotency(key, session_id, self.idempotency_ttl)
    }

    /// Reserve the dedup lease for `service_ref` and the first free tuner slot.
    ///
    /// On any failure every lease taken by this call is released before the
    /// error is returned.
    pub fn reserve_session(
        &self,
        owner: &str,
        service_ref: &str,
        tuner_slots: &[u32],
    ) -> Result<Reservation, LeaseError> {
        let mut reservation = Reservation {
            owner: owner.to_string(),
            keys: Vec::with_capacity(2),
            tuner_slot: None,
        };

        let dedup = service_key(service_ref);
        match self.try_acquire(&dedup, owner) {
            Ok((_, true)) => reservation.keys.push(dedup),
            Ok((holder, false)) => {
                return Err(LeaseError::Busy {
                    key: dedup,
                    holder: holder.owner,
                })
            }
            Err(e) => return Err(e.into()),
        }

        for &slot in tuner_slots {
            let key = tuner_key(slot);
            match self.try_acquire(&key, owner) {
                Ok((_, true)) => {
                    debug!("[Lease] {} acquired {}", owner, key);
                    reservation.keys.push(key);
                    reservation.tuner_slot = Some(slot);
                    return Ok(reservation);
                }
                Ok((_, false)) => continue,
                Err(e) => {
                    self.release_all(&reservation);
                    return Err(e.into());
                }
            }
        }

        self.release_all(&reservation);
        Err(LeaseError::NoTunerAvailable {
            slots: tuner_slots.len(),
        })
    }

    /// Extend every lease of a reservation. Returns false if any was lost.
    pub fn renew(&self, reservation: &Reservation) -> Result<bool, StoreError> {
        let mut all_held = true;
        for key in &reservation.keys {
            if self
                .store
                .renew_lease(key, &reservation.owner, self.lease_ttl)?
                .is_none()
            {
                warn!("[Lease] {} lost {}", reservation.owner, key);
                all_held = false;
            }
        }
        Ok(all_held)
    }

    /// Release every lease of a reservation. Failures are logged, not returned.
    pub fn release_all(&self, reservation: &Reservation) {
        for key in reservation.keys.iter().rev() {
            if let Err(e) = self.release(key, &reservation.owner) {
                warn!("[Lease] Failed to release {} for {}: {}", key, reservation.owner, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};

    fn manager(store: Arc<dyn StateStore>) -> LeaseManager {
        LeaseManager::new(store, Duration::from_secs(30), Duration::from_secs(300))
    }

    #[test]
    fn test_keys() {
        assert_eq!(service_key("1:0:1"), "service:1:0:1");
        assert_eq!(tuner_key(3), "tuner:3");
        let r = Reservation::for_session("s1", "ref", Some(2));
        assert_eq!(r.keys, vec!["service:ref".to_string(), "tuner:2".to_string()]);
    }

    #[test]
    fn test_first_fit_tuner() {
        let leases = manager(Arc::new(MemoryStore::new()));

        let a = leases.reserve_session("a", "ref-a", &[0, 1, 2]).unwrap();
        let b = leases.reserve_session("b", "ref-b", &[0, 1, 2]).unwrap();
        assert_eq!(a.tuner_slot, Some(0));
        assert_eq!(b.tuner_slot, Some(1));

        leases.release_all(&a);
        let c = leases.reserve_session("c", "ref-c", &[0, 1, 2]).unwrap();
        assert_eq!(c.tuner_slot, Some(0));
    }

    #[test]
    fn test_dedup_busy() {
        let leases = manager(Arc::new(MemoryStore::new()));
        leases.reserve_session("a", "ref", &[0, 1]).unwrap();

        match leases.reserve_session("b", "ref", &[0, 1]) {
            Err(LeaseError::Busy { key, holder }) => {
                assert_eq!(key, "service:ref");
                assert_eq!(holder, "a");
            }
            other => panic!("expected busy, got {:?}", other),
        }
        // The failed attempt must not hold a tuner.
        assert!(leases.try_acquire("tuner:1", "c").unwrap().1);
    }

    #[test]
    fn test_rollback_when_tuners_exhausted() {
        let leases = manager(Arc::new(MemoryStore::new()));
        leases.reserve_session("a", "ref-a", &[0]).unwrap();

        let err = leases.reserve_session("b", "ref-b", &[0]).unwrap_err();
        assert!(matches!(err, LeaseError::NoTunerAvailable { slots: 1 }));

        // Dedup lease of the failed attempt is free for anyone else.
        let (lease, acquired) = leases.try_acquire("service:ref-b", "other").unwrap();
        assert!(acquired);
        assert_eq!(lease.owner, "other");
    }

    #[test]
    fn test_renew() {
        let leases = manager(Arc::new(MemoryStore::new()));
        let r = leases.reserve_session("a", "ref", &[0]).unwrap();
        assert!(leases.renew(&r).unwrap());

        leases.release("tuner:0", "a").unwrap();
        assert!(!leases.renew(&r).unwrap());
    }

    #[test]
    fn test_idempotency_roundtrip() {
        let leases = manager(Arc::new(MemoryStore::new()));
        leases.put_idempotency("key-1", "s1").unwrap();
        assert_eq!(leases.get_idempotency("key-1").unwrap().as_deref(), Some("s1"));
        assert_eq!(leases.get_idempotency("key-2").unwrap(), None);
    }

    async fn race(store: Arc<dyn StateStore>) -> usize {
        let leases = Arc::new(manager(store));
        let mut handles = Vec::new();
        for i in 0..32 {
            let leases = leases.clone();
            handles.push(tokio::spawn(async move {
                leases.try_acquire("tuner:0", &format!("owner-{}", i)).unwrap().1
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        winners
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_exclusive_under_contention_memory() {
        assert_eq!(race(Arc::new(MemoryStore::new())).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_exclusive_under_contention_sqlite() {
        assert_eq!(race(Arc::new(SqliteStore::open_in_memory().unwrap())).await, 1);
    }
}
