//! Sliding-window circuit breaker.
//!
//! ```text
//!            trip                      reset_timeout elapsed
//!   Closed ---------> Open -----------------------------------> HalfOpen
//!     ^                ^                                          |  |
//!     |                +------------ technical failure -----------+  |
//!     +------------------- N successes (window cleared) -------------+
//! ```
//!
//! Only technical failures (crash, start timeout, stall) feed the trip logic.
//! Business failures such as "media not found" are reported through
//! [`CircuitBreaker::record_business_failure`] and never change state.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clock::Clock;
use super::window::{EventKind, SlidingWindow, WindowTotals};
use crate::metrics::GatewayMetrics;

/// Breaker state. The gauge value is exported per breaker name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    /// Gauge encoding: closed=0, open=1, half_open=2.
    pub fn gauge_value(self) -> u8 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

/// Why a breaker moved into Open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TripReason {
    ThresholdExceeded,
    HalfOpenFailure,
    ConsecutiveFailures,
}

impl TripReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TripReason::ThresholdExceeded => "threshold_exceeded",
            TripReason::HalfOpenFailure => "half_open_failure",
            TripReason::ConsecutiveFailures => "consecutive_failures",
        }
    }
}

/// Classification of an operation outcome supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    TechnicalFailure,
    BusinessFailure,
}

/// Error returned by guarded calls.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without running it.
    #[error("circuit breaker is open")]
    Open,

    /// The wrapped operation failed.
    #[error("{0}")]
    Inner(E),
}

/// Breaker tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Technical failures in the window needed to trip.
    pub threshold: u32,
    /// Attempts in the window needed before the threshold is considered.
    pub min_attempts: u32,
    /// Sliding window length.
    pub window: Duration,
    /// Cool-down before a probe is let through.
    pub reset_timeout: Duration,
    /// Probe successes needed to close again.
    pub half_open_successes: u32,
    /// Consecutive technical failures that trip regardless of the window; 0 disables.
    pub consecutive_failures: u32,
    /// Observe panics of the wrapped operation as technical failures.
    pub panic_recovery: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            min_attempts: 5,
            window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
            half_open_successes: 3,
            consecutive_failures: 0,
            panic_recovery: false,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    opened_at: Option<Instant>,
    window: SlidingWindow,
    consecutive_failures: u32,
    probe_successes: u32,
    probes_in_flight: u32,
    /// When the last HalfOpen slot was handed out.
    probe_granted_at: Option<Instant>,
}

/// Inspection view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_failures: u32,
    /// Seconds left before a probe is allowed (Open only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// A named circuit breaker. All state sits behind one mutex that is never
/// held while the guarded operation runs.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<GatewayMetrics>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new closed breaker.
    pub fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let name = name.into();
        let window = SlidingWindow::new(config.window, clock.now());
        metrics.set_breaker_state(&name, BreakerState::Closed);
        Self {
            name,
            config,
            clock,
            metrics,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                opened_at: None,
                window,
                consecutive_failures: 0,
                probe_successes: 0,
                probes_in_flight: 0,
                probe_granted_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Whether a call may proceed now.
    ///
    /// In Open, the first call after the cool-down moves the breaker to
    /// HalfOpen and is admitted as a probe. HalfOpen admits at most
    /// `half_open_successes` probes at a time. Slots whose outcome never
    /// arrived are taken back once none was handed out for `reset_timeout`.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.window.rotate(now);

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= self.config.reset_timeout)
                    .unwrap_or(true);
                if cooled {
                    self.transition(&mut inner, BreakerState::HalfOpen, None, now);
                    inner.probes_in_flight = 1;
                    inner.probe_granted_at = Some(now);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                let max_probes = self.config.half_open_successes.max(1);
                if inner.probes_in_flight < max_probes {
                    inner.probes_in_flight += 1;
                    inner.probe_granted_at = Some(now);
                    return true;
                }
                let stale = inner
                    .probe_granted_at
                    .map(|at| now.saturating_duration_since(at) >= self.config.reset_timeout)
                    .unwrap_or(true);
                if stale {
                    warn!(
                        "[Breaker {}] {} half-open slot(s) unanswered for {:?}, reclaiming",
                        self.name, inner.probes_in_flight, self.config.reset_timeout
                    );
                    inner.probes_in_flight = 1;
                    inner.probe_granted_at = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Remaining cool-down while Open.
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        Self::remaining_cooldown(&inner, &self.config, now)
    }

    fn remaining_cooldown(inner: &BreakerInner, config: &BreakerConfig, now: Instant) -> Option<Duration> {
        if inner.state != BreakerState::Open {
            return None;
        }
        let elapsed = inner
            .opened_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(config.reset_timeout);
        Some(config.reset_timeout.saturating_sub(elapsed))
    }

    /// Remaining cool-down in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(ceil_secs)
    }

    /// Record that a guarded operation was committed (e.g. a transcoder spawn).
    pub fn record_attempt(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.window.record(EventKind::Attempt, now);
        self.evaluate(&mut inner, now);
    }

    /// Record a successful completion or an intentional cancel.
    pub fn record_success(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.window.record(EventKind::Success, now);
        inner.consecutive_failures = 0;

        if inner.state == BreakerState::HalfOpen {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
            inner.probe_successes += 1;
            if inner.probe_successes >= self.config.half_open_successes {
                self.transition(&mut inner, BreakerState::Closed, None, now);
            }
        }
    }

    /// Record a crash, start timeout or stall.
    pub fn record_technical_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.window.record(EventKind::TechnicalFailure, now);
        inner.consecutive_failures += 1;

        if inner.state == BreakerState::HalfOpen {
            self.transition(&mut inner, BreakerState::Open, Some(TripReason::HalfOpenFailure), now);
            return;
        }
        self.evaluate(&mut inner, now);
    }

    /// Record a failure that says nothing about subsystem health.
    ///
    /// Trip logic ignores it; a HalfOpen probe slot taken by the call is
    /// handed back.
    pub fn record_business_failure(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
        }
        debug!("[Breaker {}] business failure ignored", self.name);
    }

    /// Record a caller-classified outcome.
    pub fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.record_success(),
            Outcome::TechnicalFailure => self.record_technical_failure(),
            Outcome::BusinessFailure => self.record_business_failure(),
        }
    }

    /// Run `op` under the breaker.
    ///
    /// `classify` maps the result to the outcome to record. `None` means the
    /// call committed work whose outcome is reported later: only the attempt
    /// is recorded and a HalfOpen slot stays taken until then. With
    /// panic recovery enabled a panic is recorded as a technical failure and
    /// then resumed.
    pub fn execute<T, E, F, C>(&self, op: F, classify: C) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        C: FnOnce(&Result<T, E>) -> Option<Outcome>,
    {
        if !self.allow() {
            return Err(BreakerError::Open);
        }

        let result = if self.config.panic_recovery {
            match panic::catch_unwind(AssertUnwindSafe(op)) {
                Ok(result) => result,
                Err(payload) => {
                    self.record_attempt();
                    self.record_technical_failure();
                    panic::resume_unwind(payload);
                }
            }
        } else {
            op()
        };

        match classify(&result) {
            Some(outcome) => self.record(outcome),
            None => self.record_attempt(),
        }
        result.map_err(BreakerError::Inner)
    }

    /// Copy of the breaker state for inspection endpoints.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let totals = inner.window.totals(now);
        let retry_after_secs = Self::remaining_cooldown(&inner, &self.config, now).map(ceil_secs);
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            attempts: totals.effective_attempts(),
            successes: totals.successes,
            failures: totals.failures,
            consecutive_failures: inner.consecutive_failures,
            retry_after_secs,
        }
    }

    fn evaluate(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state != BreakerState::Closed {
            return;
        }
        let totals: WindowTotals = inner.window.totals(now);
        if totals.effective_attempts() >= self.config.min_attempts
            && totals.failures >= self.config.threshold
        {
            self.transition(inner, BreakerState::Open, Some(TripReason::ThresholdExceeded), now);
            return;
        }
        if self.config.consecutive_failures > 0
            && inner.consecutive_failures >= self.config.consecutive_failures
        {
            self.transition(inner, BreakerState::Open, Some(TripReason::ConsecutiveFailures), now);
        }
    }

    fn transition(
        &self,
        inner: &mut BreakerInner,
        next: BreakerState,
        reason: Option<TripReason>,
        now: Instant,
    ) {
        let previous = inner.state;
        inner.state = next;

        match next {
            BreakerState::Open => {
                inner.opened_at = Some(now);
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
                inner.probe_granted_at = None;
                let reason = reason.unwrap_or(TripReason::ThresholdExceeded);
                self.metrics.record_breaker_trip(&self.name, reason);
                warn!(
                    "[Breaker {}] {} -> open ({})",
                    self.name,
                    previous.as_str(),
                    reason.as_str()
                );
            }
            BreakerState::HalfOpen => {
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
                inner.probe_granted_at = None;
                info!("[Breaker {}] open -> half_open, probing", self.name);
            }
            BreakerState::Closed => {
                inner.opened_at = None;
                inner.window.clear();
                inner.consecutive_failures = 0;
                inner.probe_successes = 0;
                inner.probes_in_flight = 0;
                inner.probe_granted_at = None;
                info!("[Breaker {}] {} -> closed", self.name, previous.as_str());
            }
        }

        self.metrics.set_breaker_state(&self.name, next);
    }
}

/// Whole seconds, rounded up.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;

    fn breaker(config: BreakerConfig) -> (CircuitBreaker, Arc<ManualClock>, Arc<GatewayMetrics>) {
        let clock = Arc::new(ManualClock::new());
        let metrics = GatewayMetrics::new();
        let cb = CircuitBreaker::new("transcoder", config, clock.clone(), metrics.clone());
        (cb, clock, metrics)
    }

    #[test]
    fn test_trip_and_recover_cycle() {
        let (cb, clock, metrics) = breaker(BreakerConfig::default());

        for _ in 0..4 {
            cb.record_technical_failure();
            assert_eq!(cb.state(), BreakerState::Closed);
        }
        cb.record_technical_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
        assert_eq!(metrics.breaker_gauge("transcoder"), Some(1));
        assert_eq!(metrics.breaker_trips("transcoder", TripReason::ThresholdExceeded), 1);

        clock.advance(Duration::from_secs(30));
        assert!(cb.allow());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert_eq!(metrics.breaker_gauge("transcoder"), Some(2));

        // One probe failure re-opens.
        cb.record_technical_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
        assert_eq!(metrics.breaker_trips("transcoder", TripReason::HalfOpenFailure), 1);

        // Three probe successes close and clear history.
        clock.advance(Duration::from_secs(30));
        assert!(cb.allow());
        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(metrics.breaker_gauge("transcoder"), Some(0));

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.attempts, 0);
    }

    #[test]
    fn test_min_attempts_gate() {
        let (cb, _clock, _metrics) = breaker(BreakerConfig::default());

        // Three failures alone are not enough data.
        for _ in 0..3 {
            cb.record_technical_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.record_attempt();
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_attempt();
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_attempt();
        cb.record_attempt();
        cb.record_attempt();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_consecutive_failures_trip() {
        let (cb, clock, metrics) = breaker(BreakerConfig {
            consecutive_failures: 3,
            ..Default::default()
        });

        cb.record_technical_failure();
        cb.record_technical_failure();
        assert!(cb.allow());
        cb.record_technical_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.allow());
        assert_eq!(metrics.breaker_trips("transcoder", TripReason::ConsecutiveFailures), 1);

        clock.advance(Duration::from_secs(10));
        assert!(!cb.allow());
        assert_eq!(cb.retry_after(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let (cb, _clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 3,
            threshold: 10,
            ..Default::default()
        });

        cb.record_technical_failure();
        cb.record_technical_failure();
        cb.record_success();
        cb.record_technical_failure();
        cb.record_technical_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_business_failures_ignored() {
        let (cb, _clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 1,
            ..Default::default()
        });

        for _ in 0..20 {
            cb.record(Outcome::BusinessFailure);
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().failures, 0);
    }

    #[test]
    fn test_failures_age_out_of_window() {
        let (cb, clock, _metrics) = breaker(BreakerConfig::default());

        for _ in 0..4 {
            cb.record_technical_failure();
        }
        clock.advance(Duration::from_secs(61));
        cb.record_technical_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_limits_probes() {
        let (cb, clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 1,
            half_open_successes: 2,
            ..Default::default()
        });

        cb.record_technical_failure();
        clock.advance(Duration::from_secs(30));
        assert!(cb.allow());
        assert!(cb.allow());
        assert!(!cb.allow());

        cb.record_success();
        assert!(cb.allow());
    }

    #[test]
    fn test_business_failure_returns_probe_slot() {
        let (cb, clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 1,
            half_open_successes: 1,
            ..Default::default()
        });

        cb.record_technical_failure();
        clock.advance(Duration::from_secs(30));
        assert!(cb.allow());
        assert!(!cb.allow());

        cb.record_business_failure();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.allow());
    }

    #[test]
    fn test_unanswered_half_open_slot_is_reclaimed() {
        let (cb, clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 1,
            half_open_successes: 1,
            ..Default::default()
        });

        cb.record_technical_failure();
        clock.advance(Duration::from_secs(30));
        assert!(cb.allow());
        cb.record_attempt();
        assert!(!cb.allow());

        // The outcome never arrives.
        clock.advance(Duration::from_secs(10));
        assert!(!cb.allow());
        clock.advance(Duration::from_secs(3600));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.allow());
        assert!(!cb.allow());

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let (cb, clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 1,
            ..Default::default()
        });

        cb.record_technical_failure();
        clock.advance(Duration::from_millis(29_500));
        assert_eq!(cb.retry_after(), Some(Duration::from_millis(500)));
        assert_eq!(cb.retry_after_secs(), Some(1));
        assert_eq!(cb.snapshot().retry_after_secs, Some(1));

        clock.advance(Duration::from_millis(500));
        assert_eq!(cb.retry_after_secs(), Some(0));
        assert!(cb.allow());
        assert_eq!(cb.retry_after_secs(), None);
    }

    #[test]
    fn test_execute_records_outcomes() {
        let (cb, _clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 2,
            ..Default::default()
        });
        let technical = |r: &Result<(), &'static str>| r.as_ref().err().map(|_| Outcome::TechnicalFailure);

        let ok: Result<u32, BreakerError<&str>> = cb.execute(|| Ok(7), |_| Some(Outcome::Success));
        assert_eq!(ok.unwrap(), 7);

        let not_found = cb.execute(|| Err::<(), _>("not found"), |_| Some(Outcome::BusinessFailure));
        assert!(matches!(not_found, Err(BreakerError::Inner("not found"))));
        assert_eq!(cb.state(), BreakerState::Closed);

        let _ = cb.execute(|| Err::<(), _>("crash"), technical);
        let _ = cb.execute(|| Err::<(), _>("crash"), technical);
        assert_eq!(cb.state(), BreakerState::Open);

        let rejected = cb.execute(|| Ok::<_, &str>(()), technical);
        assert!(matches!(rejected, Err(BreakerError::Open)));
    }

    #[test]
    fn test_execute_deferred_outcome_holds_slot() {
        let (cb, clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 1,
            half_open_successes: 1,
            ..Default::default()
        });

        cb.record_technical_failure();
        clock.advance(Duration::from_secs(30));
        let spawned = cb.execute(|| Ok::<_, &str>("spawned"), |_| None);
        assert_eq!(spawned.unwrap(), "spawned");
        assert_eq!(cb.snapshot().attempts, 1);

        // Outcome still pending: no second call.
        let rejected = cb.execute(|| Ok::<_, &str>("again"), |_| None);
        assert!(matches!(rejected, Err(BreakerError::Open)));

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_panic_is_recorded_and_resumed() {
        let (cb, _clock, _metrics) = breaker(BreakerConfig {
            consecutive_failures: 1,
            panic_recovery: true,
            ..Default::default()
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = cb.execute(|| -> Result<(), &str> { panic!("transcoder exploded") }, |_| None);
        }));
        assert!(result.is_err());
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
