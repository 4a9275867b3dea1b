//! SQLite-backed store.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use xg2g_protocol::SessionState;

use super::schema::SCHEMA_SQL;
use super::{expiry_ms, now_ms, Lease, Result, SessionRecord, StateStore, StoreError};

const SESSION_COLUMNS: &str =
    "session_id, service_ref, profile, state, correlation_id, created_at, updated_at, context";

/// Persistent [`StateStore`] on a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Raw session row before validation.
struct SessionRow {
    session_id: String,
    service_ref: String,
    profile: Option<String>,
    state: String,
    correlation_id: String,
    created_at: i64,
    updated_at: i64,
    context: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            service_ref: row.get(1)?,
            profile: row.get(2)?,
            state: row.get(3)?,
            correlation_id: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            context: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<SessionRecord> {
        let state = SessionState::parse(&self.state)
            .map_err(|e| StoreError::Corrupt(format!("session {}: {}", self.session_id, e)))?;
        let context: BTreeMap<String, String> = serde_json::from_str(&self.context)?;
        Ok(SessionRecord {
            session_id: self.session_id,
            service_ref: self.service_ref,
            profile: self.profile,
            state,
            correlation_id: self.correlation_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            context,
        })
    }
}

fn write_session(conn: &Connection, record: &SessionRecord) -> Result<()> {
    let context = serde_json::to_string(&record.context)?;
    conn.execute(
        r#"
        INSERT INTO sessions (session_id, service_ref, profile, state, correlation_id, created_at, updated_at, context)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(session_id) DO UPDATE SET
            service_ref = excluded.service_ref,
            profile = excluded.profile,
            state = excluded.state,
            correlation_id = excluded.correlation_id,
            updated_at = excluded.updated_at,
            context = excluded.context
        "#,
        params![
            record.session_id,
            record.service_ref,
            record.profile,
            record.state.as_str(),
            record.correlation_id,
            record.created_at,
            record.updated_at,
            context,
        ],
    )?;
    Ok(())
}

fn read_session(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM sessions WHERE session_id = ?1", SESSION_COLUMNS),
            params![session_id],
            SessionRow::from_row,
        )
        .optional()?;
    row.map(SessionRow::into_record).transpose()
}

fn read_lease(conn: &Connection, key: &str) -> Result<Option<Lease>> {
    let lease = conn
        .query_row(
            "SELECT key, owner, expires_at FROM leases WHERE key = ?1",
            params![key],
            |row| {
                Ok(Lease {
                    key: row.get(0)?,
                    owner: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(lease)
}

impl StateStore for SqliteStore {
    fn put_session(&self, record: &SessionRecord) -> Result<()> {
        write_session(&self.conn.lock(), record)
    }

    fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        read_session(&self.conn.lock(), session_id)
    }

    fn update_session(
        &self,
        session_id: &str,
        update: &mut dyn FnMut(&mut SessionRecord) -> Result<()>,
    ) -> Result<SessionRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut record = read_session(&tx, session_id)?
            .ok_or_else(|| StoreError::SessionNotFound(session_id.to_string()))?;
        update(&mut record)?;
        write_session(&tx, &record)?;

        tx.commit()?;
        Ok(record)
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY created_at, session_id",
            SESSION_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], SessionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(SessionRow::into_record).collect()
    }

    fn try_acquire_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<(Lease, bool)> {
        let now = now_ms();
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = read_lease(&tx, key)? {
            if existing.owner != owner && !existing.is_expired(now) {
                return Ok((existing, false));
            }
        }

        let lease = Lease {
            key: key.to_string(),
            owner: owner.to_string(),
            expires_at: expiry_ms(now, ttl),
        };
        tx.execute(
            "INSERT OR REPLACE INTO leases (key, owner, expires_at) VALUES (?1, ?2, ?3)",
            params![lease.key, lease.owner, lease.expires_at],
        )?;
        tx.commit()?;
        Ok((lease, true))
    }

    fn renew_lease(&self, key: &str, owner: &str, ttl: Duration) -> Result<Option<Lease>> {
        let now = now_ms();
        let expires_at = expiry_ms(now, ttl);
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE leases SET expires_at = ?1 WHERE key = ?2 AND owner = ?3 AND expires_at > ?4",
            params![expires_at, key, owner, now],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(Lease {
            key: key.to_string(),
            owner: owner.to_string(),
            expires_at,
        }))
    }

    fn release_lease(&self, key: &str, owner: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM leases WHERE key = ?1 AND owner = ?2",
            params![key, owner],
        )?;
        Ok(())
    }

    fn delete_all_leases(&self) -> Result<usize> {
        Ok(self.conn.lock().execute("DELETE FROM leases", [])?)
    }

    fn get_idempotency(&self, key: &str) -> Result<Option<String>> {
        let now = now_ms();
        let conn = self.conn.lock();
        let entry: Option<(String, i64)> = conn
            .query_row(
                "SELECT session_id, expires_at FROM idempotency WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match entry {
            Some((session_id, expires_at)) if expires_at > now => Ok(Some(session_id)),
            Some(_) => {
                conn.execute("DELETE FROM idempotency WHERE key = ?1", params![key])?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put_idempotency(&self, key: &str, session_id: &str, ttl: Duration) -> Result<()> {
        let now = now_ms();
        let conn = self.conn.lock();
        let purged = conn.execute("DELETE FROM idempotency WHERE expires_at <= ?1", params![now])?;
        if purged > 0 {
            debug!("[Store] Purged {} expired idempotency keys", purged);
        }
        conn.execute(
            "INSERT OR REPLACE INTO idempotency (key, session_id, expires_at) VALUES (?1, ?2, ?3)",
            params![key, session_id, expiry_ms(now, ttl)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_sessions() {
        conformance::sessions(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_leases() {
        conformance::leases(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_lease_expiry() {
        conformance::lease_expiry(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_delete_all_leases() {
        conformance::delete_all(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_idempotency() {
        conformance::idempotency(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_session(&conformance::sample_session("s1")).unwrap();
            store.put_idempotency("k", "s1", Duration::from_secs(300)).unwrap();
            store
                .try_acquire_lease("tuner:0", "s1", Duration::from_secs(30))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_session("s1").unwrap().unwrap().service_ref, "1:0:19:283D:3FB:1:C00000:0:0:0:");
        assert_eq!(store.get_idempotency("k").unwrap().as_deref(), Some("s1"));
        assert_eq!(store.delete_all_leases().unwrap(), 1);
    }

    #[test]
    fn test_put_idempotency_purges_expired() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_idempotency("stale", "s1", Duration::ZERO).unwrap();
        store.put_idempotency("live", "s2", Duration::from_secs(300)).unwrap();

        let keys: Vec<String> = {
            let conn = store.conn.lock();
            let mut stmt = conn.prepare("SELECT key FROM idempotency ORDER BY key").unwrap();
            let rows = stmt.query_map([], |row| row.get(0)).unwrap();
            rows.collect::<std::result::Result<_, _>>().unwrap()
        };
        assert_eq!(keys, vec!["live".to_string()]);
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put_session(&conformance::sample_session("s1")).unwrap();
        store
            .conn
            .lock()
            .execute("UPDATE sessions SET state = 'zombie' WHERE session_id = 's1'", [])
            .unwrap();

        let err = store.get_session("s1").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
