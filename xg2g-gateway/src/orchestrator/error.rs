//! Intent error kinds and their client-facing mapping.

use thiserror::Error;
use xg2g_protocol::{Problem, ProblemCode};

use crate::metrics::IntentOutcome;

/// Structured failure of one intent.
///
/// Each kind maps to exactly one HTTP status. Internal details are kept for
/// logs and never copied into the problem body.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A dedup or tuner lease is held by another session.
    #[error("Lease busy")]
    LeaseBusy { retry_after_secs: u32 },

    /// The configuration lists no tuner slot at all.
    #[error("No tuner slots configured")]
    NoTunerSlots,

    /// The admission controller refused the intent.
    #[error("Admission rejected: {}", .0.code)]
    Admission(Problem),

    #[error("Circuit {name} is open")]
    BreakerOpen { name: String, retry_after_secs: u32 },

    /// The client went away; leases taken for it were released.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Illegal session transition {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// A heartbeat found one of the session's leases held by nobody or by
    /// someone else.
    #[error("Session {0} lost its lease")]
    LeaseLost(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntentError {
    /// HTTP status of this error.
    pub fn status(&self) -> u16 {
        match self {
            IntentError::BadRequest(_) => 400,
            IntentError::LeaseBusy { .. } | IntentError::InvalidTransition { .. } | IntentError::LeaseLost(_) => 409,
            IntentError::NoTunerSlots | IntentError::BreakerOpen { .. } | IntentError::Cancelled => 503,
            IntentError::Admission(problem) => problem.status,
            IntentError::NotFound(_) => 404,
            IntentError::Internal(_) => 500,
        }
    }

    /// Metrics bucket of this error.
    pub fn outcome(&self) -> IntentOutcome {
        match self {
            IntentError::BadRequest(_) | IntentError::NotFound(_) | IntentError::InvalidTransition { .. } => {
                IntentOutcome::BadRequest
            }
            IntentError::LeaseBusy { .. } | IntentError::LeaseLost(_) => IntentOutcome::Conflict,
            IntentError::NoTunerSlots
            | IntentError::Admission(_)
            | IntentError::BreakerOpen { .. }
            | IntentError::Cancelled => IntentOutcome::Rejected,
            IntentError::Internal(_) => IntentOutcome::Error,
        }
    }

    /// Client-safe problem body.
    pub fn to_problem(&self, correlation_id: &str) -> Problem {
        let problem = match self {
            IntentError::BadRequest(detail) => {
                Problem::new(ProblemCode::InvalidInput, 400, "Bad request", detail.clone())
            }
            IntentError::LeaseBusy { retry_after_secs } => Problem::new(
                ProblemCode::LeaseBusy,
                409,
                "Lease busy",
                "the service or every tuner is held by another session",
            )
            .with_retry_after(*retry_after_secs),
            IntentError::NoTunerSlots => Problem::new(
                ProblemCode::NoTuners,
                503,
                "No tuners",
                "no tuner slots configured",
            ),
            IntentError::Admission(problem) => problem.clone(),
            IntentError::BreakerOpen { retry_after_secs, .. } => Problem::new(
                ProblemCode::CircuitOpen,
                503,
                "Circuit open",
                "the transcoder is unhealthy; try again later",
            )
            .with_retry_after(*retry_after_secs),
            IntentError::Cancelled => Problem::new(
                ProblemCode::Cancelled,
                503,
                "Cancelled",
                "the request was cancelled before completion",
            ),
            IntentError::NotFound(_) => {
                Problem::new(ProblemCode::NotFound, 404, "Not found", "session does not exist")
            }
            IntentError::InvalidTransition { from, to } => Problem::new(
                ProblemCode::InvalidInput,
                409,
                "Invalid transition",
                format!("session cannot move from {} to {}", from, to),
            ),
            IntentError::LeaseLost(_) => Problem::new(
                ProblemCode::LeaseBusy,
                409,
                "Lease lost",
                "the session no longer holds its leases",
            ),
            IntentError::Internal(_) => Problem::new(
                ProblemCode::Internal,
                500,
                "Internal error",
                "the intent could not be processed",
            ),
        };
        problem.with_correlation_id(correlation_id)
    }
}
