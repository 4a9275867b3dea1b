//! Live load counters read by admission.
//!
//! Only the side that actually starts and stops sessions mutates these.
//! Admission reads a [`RuntimeState`] snapshot and never writes.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;

/// Snapshot of current load. Negative values mean a counting fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeState {
    pub tuner_slots: i64,
    pub active_sessions: i64,
    pub active_transcodes: i64,
}

/// Shared session and transcode counters.
#[derive(Debug, Default)]
pub struct RuntimeCounters {
    active_sessions: AtomicI64,
    active_transcodes: AtomicI64,
}

impl RuntimeCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::Release);
    }

    pub fn session_ended(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Release);
    }

    pub fn transcode_started(&self) {
        self.active_transcodes.fetch_add(1, Ordering::Release);
    }

    pub fn transcode_ended(&self) {
        self.active_transcodes.fetch_sub(1, Ordering::Release);
    }

    /// Build the admission input for `tuner_slots` configured slots.
    pub fn snapshot(&self, tuner_slots: usize) -> RuntimeState {
        RuntimeState {
            tuner_slots: i64::try_from(tuner_slots).unwrap_or(i64::MAX),
            active_sessions: self.active_sessions.load(Ordering::Acquire),
            active_transcodes: self.active_transcodes.load(Ordering::Acquire),
        }
    }
}
