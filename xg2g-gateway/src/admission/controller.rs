//! Ordered capacity rules.
//!
//! Rules are evaluated in a fixed order and the first failing rule decides:
//!
//! 1. engine disabled      -> `ENGINE_DISABLED`
//! 2. any counter negative -> `STATE_UNKNOWN` (fail closed)
//! 3. no tuner slots       -> `NO_TUNERS`
//! 4. sessions at limit    -> `SESSIONS_FULL`
//! 5. transcode requested and transcodes at limit -> `TRANSCODES_FULL`

use xg2g_protocol::{Problem, ProblemCode};

use super::runtime::RuntimeState;

/// Static admission limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionLimits {
    pub engine_enabled: bool,
    pub max_sessions: i64,
    pub max_transcodes: i64,
    /// Retry hint attached to transient rejections.
    pub retry_after_secs: u32,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            engine_enabled: true,
            max_sessions: 8,
            max_transcodes: 2,
            retry_after_secs: 1,
        }
    }
}

/// What the caller wants admitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionRequest {
    pub wants_transcode: bool,
}

/// Result of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    allow: bool,
    problem: Option<Problem>,
}

impl AdmissionDecision {
    fn allow() -> Self {
        Self {
            allow: true,
            problem: None,
        }
    }

    fn reject(problem: Problem) -> Self {
        Self {
            allow: false,
            problem: Some(problem),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allow
    }

    pub fn problem(&self) -> Option<&Problem> {
        self.problem.as_ref()
    }

    pub fn code(&self) -> Option<ProblemCode> {
        self.problem.as_ref().map(|p| p.code)
    }

    pub fn retry_after_secs(&self) -> Option<u32> {
        self.problem.as_ref().and_then(|p| p.retry_after_secs)
    }

    /// Consume the decision, yielding the rejection problem if any.
    pub fn into_problem(self) -> Option<Problem> {
        self.problem
    }
}

/// Stateless admission controller.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    limits: AdmissionLimits,
}

impl AdmissionController {
    /// Create a new controller.
    pub fn new(limits: AdmissionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &AdmissionLimits {
        &self.limits
    }

    /// Evaluate the rules against a runtime snapshot.
    pub fn check(&self, req: &AdmissionRequest, state: &RuntimeState) -> AdmissionDecision {
        if !self.limits.engine_enabled {
            return AdmissionDecision::reject(Problem::new(
                ProblemCode::EngineDisabled,
                503,
                "Engine disabled",
                "the streaming engine is disabled by configuration",
            ));
        }

        if state.tuner_slots < 0 || state.active_sessions < 0 || state.active_transcodes < 0 {
            return AdmissionDecision::reject(Problem::new(
                ProblemCode::StateUnknown,
                503,
                "State unknown",
                "runtime counters are inconsistent; refusing new sessions",
            ));
        }

        if state.tuner_slots == 0 {
            return AdmissionDecision::reject(
                Problem::new(
                    ProblemCode::NoTuners,
                    503,
                    "No tuners",
                    format!("no tuner slots available (configured: {})", state.tuner_slots),
                )
                .with_retry_after(self.limits.retry_after_secs),
            );
        }

        if state.active_sessions >= self.limits.max_sessions {
            return AdmissionDecision::reject(
                Problem::new(
                    ProblemCode::SessionsFull,
                    503,
                    "Sessions full",
                    format!("session limit reached ({}/{})", state.active_sessions, self.limits.max_sessions),
                )
                .with_retry_after(self.limits.retry_after_secs),
            );
        }

        if req.wants_transcode && state.active_transcodes >= self.limits.max_transcodes {
            return AdmissionDecision::reject(
                Problem::new(
                    ProblemCode::TranscodesFull,
                    503,
                    "Transcodes full",
                    format!(
                        "transcode limit reached ({}/{})",
                        state.active_transcodes, self.limits.max_transcodes
                    ),
                )
                .with_retry_after(self.limits.retry_after_secs),
            );
        }

        AdmissionDecision::allow()
    }
}
