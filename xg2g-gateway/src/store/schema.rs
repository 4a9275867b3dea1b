//! Database schema definitions.

/// SQL schema for the gateway state database.
pub const SCHEMA_SQL: &str = r#"
-- Accepted intents
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    service_ref TEXT NOT NULL,
    profile TEXT,
    state TEXT NOT NULL,                 -- starting|ready|failed|cancelled|ended
    correlation_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,         -- unix seconds
    updated_at INTEGER NOT NULL,
    context TEXT NOT NULL DEFAULT '{}'   -- JSON object of string values
);

CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at);

-- Exclusive reservations (service:<ref>, tuner:<slot>)
CREATE TABLE IF NOT EXISTS leases (
    key TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    expires_at INTEGER NOT NULL          -- unix milliseconds
);

-- Idempotency key -> session mapping
CREATE TABLE IF NOT EXISTS idempotency (
    key TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    expires_at INTEGER NOT NULL          -- unix milliseconds
);
"#;
