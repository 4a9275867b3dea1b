//! Gateway metrics collection and reporting.
//!
//! This module tracks the counters operators alert on:
//! - circuit breaker state per breaker name
//! - breaker trips keyed by name and reason
//! - admission rejections keyed by problem code
//! - intent outcomes (accepted, replayed, conflict, ...)

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use xg2g_protocol::ProblemCode;

use crate::resilience::{BreakerState, TripReason};

/// Final outcome of one `POST /intents` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    Accepted,
    Replayed,
    Conflict,
    Rejected,
    BadRequest,
    Error,
}

/// Point-in-time copy of the intent outcome counters.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct IntentCounts {
    pub accepted: u64,
    pub replayed: u64,
    pub conflict: u64,
    pub rejected: u64,
    pub bad_request: u64,
    pub error: u64,
}

/// Gauge entry for one breaker.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BreakerGauge {
    pub state: &'static str,
    pub value: u8,
}

/// One trip counter entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TripCount {
    pub breaker: String,
    pub reason: &'static str,
    pub count: u64,
}

/// JSON view served by `GET /api/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub intents: IntentCounts,
    pub admission_rejections: BTreeMap<&'static str, u64>,
    pub breaker_state: BTreeMap<String, BreakerGauge>,
    pub breaker_trips: Vec<TripCount>,
}

/// System-level metrics aggregator shared by all gateway components.
#[derive(Default)]
pub struct GatewayMetrics {
    intents_accepted: AtomicU64,
    intents_replayed: AtomicU64,
    intents_conflict: AtomicU64,
    intents_rejected: AtomicU64,
    intents_bad_request: AtomicU64,
    intents_error: AtomicU64,
    admission_rejections: Mutex<BTreeMap<ProblemCode, u64>>,
    breaker_state: Mutex<BTreeMap<String, BreakerState>>,
    breaker_trips: Mutex<BTreeMap<(String, TripReason), u64>>,
}

impl GatewayMetrics {
    /// Create a new gateway metrics instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record an intent outcome.
    pub fn record_intent(&self, outcome: IntentOutcome) {
        let counter = match outcome {
            IntentOutcome::Accepted => &self.intents_accepted,
            IntentOutcome::Replayed => &self.intents_replayed,
            IntentOutcome::Conflict => &self.intents_conflict,
            IntentOutcome::Rejected => &self.intents_rejected,
            IntentOutcome::BadRequest => &self.intents_bad_request,
            IntentOutcome::Error => &self.intents_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an admission rejection.
    pub fn record_admission_rejection(&self, code: ProblemCode) {
        *self.admission_rejections.lock().entry(code).or_insert(0) += 1;
    }

    /// Update the state gauge of a breaker.
    pub fn set_breaker_state(&self, name: &str, state: BreakerState) {
        self.breaker_state.lock().insert(name.to_string(), state);
    }

    /// Count a breaker trip.
    pub fn record_breaker_trip(&self, name: &str, reason: TripReason) {
        *self
            .breaker_trips
            .lock()
            .entry((name.to_string(), reason))
            .or_insert(0) += 1;
    }

    /// Get intent outcome counts.
    pub fn intent_counts(&self) -> IntentCounts {
        IntentCounts {
            accepted: self.intents_accepted.load(Ordering::Relaxed),
            replayed: self.intents_replayed.load(Ordering::Relaxed),
            conflict: self.intents_conflict.load(Ordering::Relaxed),
            rejected: self.intents_rejected.load(Ordering::Relaxed),
            bad_request: self.intents_bad_request.load(Ordering::Relaxed),
            error: self.intents_error.load(Ordering::Relaxed),
        }
    }

    /// Get the trip count for one breaker and reason.
    pub fn breaker_trips(&self, name: &str, reason: TripReason) -> u64 {
        self.breaker_trips
            .lock()
            .get(&(name.to_string(), reason))
            .copied()
            .unwrap_or(0)
    }

    /// Get the gauge value of a breaker, if it was ever observed.
    pub fn breaker_gauge(&self, name: &str) -> Option<u8> {
        self.breaker_state.lock().get(name).map(|s| s.gauge_value())
    }

    /// Get the rejection count for an admission code.
    pub fn admission_rejections(&self, code: ProblemCode) -> u64 {
        self.admission_rejections.lock().get(&code).copied().unwrap_or(0)
    }

    /// Copy every counter into a serializable snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let admission_rejections = self
            .admission_rejections
            .lock()
            .iter()
            .map(|(code, count)| (code.as_str(), *count))
            .collect();
        let breaker_state = self
            .breaker_state
            .lock()
            .iter()
            .map(|(name, state)| {
                (
                    name.clone(),
                    BreakerGauge {
                        state: state.as_str(),
                        value: state.gauge_value(),
                    },
                )
            })
            .collect();
        let breaker_trips = self
            .breaker_trips
            .lock()
            .iter()
            .map(|((name, reason), count)| TripCount {
                breaker: name.clone(),
                reason: reason.as_str(),
                count: *count,
            })
            .collect();

        MetricsSnapshot {
            intents: self.intent_counts(),
            admission_rejections,
            breaker_state,
            breaker_trips,
        }
    }

    /// Print a metrics report.
    pub fn print_report(&self) {
        let counts = self.intent_counts();
        info!(
            "[Gateway] Metrics: intents accepted={} replayed={} conflict={} \
             rejected={} bad_request={} error={}",
            counts.accepted,
            counts.replayed,
            counts.conflict,
            counts.rejected,
            counts.bad_request,
            counts.error
        );
    }
}
