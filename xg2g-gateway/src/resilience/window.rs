//! Bucketed sliding window of breaker outcomes.
//!
//! The window is a fixed ring of [`BUCKETS`] counters. The bucket for an
//! instant is `(elapsed / bucket_span) mod BUCKETS`; buckets that fell out of
//! the window are cleared lazily whenever the window is touched, so memory
//! stays constant regardless of traffic.

use std::time::{Duration, Instant};

/// Number of buckets in the ring.
pub const BUCKETS: usize = 60;

/// Kind of outcome recorded in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A protected operation was committed.
    Attempt,
    /// The operation completed or was cancelled on purpose.
    Success,
    /// The operation crashed, stalled or timed out.
    TechnicalFailure,
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    attempts: u32,
    successes: u32,
    failures: u32,
}

/// Aggregated counts over the live part of the window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowTotals {
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
}

impl WindowTotals {
    /// Attempts seen in the window.
    ///
    /// Callers that only report outcomes never record explicit attempts, so
    /// every outcome also counts as one attempt.
    pub fn effective_attempts(&self) -> u32 {
        self.attempts.max(self.successes + self.failures)
    }
}

/// Ring of time buckets covering `bucket_span * BUCKETS`.
#[derive(Debug)]
pub struct SlidingWindow {
    buckets: [Bucket; BUCKETS],
    bucket_span: Duration,
    origin: Instant,
    last_tick: u64,
}

impl SlidingWindow {
    /// Create a window spanning `span`, starting at `origin`.
    pub fn new(span: Duration, origin: Instant) -> Self {
        let bucket_span = (span / BUCKETS as u32).max(Duration::from_millis(1));
        Self {
            buckets: [Bucket::default(); BUCKETS],
            bucket_span,
            origin,
            last_tick: 0,
        }
    }

    fn tick(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin);
        (elapsed.as_nanos() / self.bucket_span.as_nanos()) as u64
    }

    /// Clear buckets that are older than the window.
    pub fn rotate(&mut self, now: Instant) {
        let tick = self.tick(now);
        if tick <= self.last_tick {
            return;
        }
        let steps = (tick - self.last_tick).min(BUCKETS as u64);
        for step in 1..=steps {
            let idx = ((self.last_tick + step) % BUCKETS as u64) as usize;
            self.buckets[idx] = Bucket::default();
        }
        self.last_tick = tick;
    }

    /// Record one event at `now`.
    pub fn record(&mut self, kind: EventKind, now: Instant) {
        self.rotate(now);
        let idx = (self.last_tick % BUCKETS as u64) as usize;
        let bucket = &mut self.buckets[idx];
        match kind {
            EventKind::Attempt => bucket.attempts += 1,
            EventKind::Success => bucket.successes += 1,
            EventKind::TechnicalFailure => bucket.failures += 1,
        }
    }

    /// Sum of all live buckets at `now`.
    pub fn totals(&mut self, now: Instant) -> WindowTotals {
        self.rotate(now);
        self.buckets.iter().fold(WindowTotals::default(), |mut acc, b| {
            acc.attempts += b.attempts;
            acc.successes += b.successes;
            acc.failures += b.failures;
            acc
        })
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.buckets = [Bucket::default(); BUCKETS];
    }
}
