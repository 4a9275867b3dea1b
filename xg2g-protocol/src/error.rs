//! Error types and problem bodies for the xg2g gateway protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while interpreting protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Playback mode other than `live`/`recording`.
    #[error("Unsupported playback mode: {0}")]
    UnsupportedMode(String),

    /// Recording playback is served by a different path.
    #[error("Recording playback uses /recordings")]
    RecordingNotAdmitted,

    /// Intent type is unknown.
    #[error("Unsupported intent type: {0}")]
    UnknownIntentType(String),

    /// Session state string is unknown.
    #[error("Unknown session state: {0}")]
    UnknownSessionState(String),

    /// `profile` and `profileID` were both supplied and differ.
    #[error("profile and profileID must match when both are set")]
    ProfileMismatch,
}

/// Stable machine-readable problem codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemCode {
    /// Streaming engine switched off by configuration.
    EngineDisabled,
    /// Runtime counters are corrupt (negative).
    StateUnknown,
    /// No tuner slot is configured.
    NoTuners,
    /// Session limit reached.
    SessionsFull,
    /// Transcode limit reached.
    TranscodesFull,
    /// A lease needed by the intent is held by someone else.
    LeaseBusy,
    /// Request body or headers are malformed.
    InvalidInput,
    /// Referenced entity does not exist.
    NotFound,
    /// Caller may not play this content.
    Forbidden,
    /// Media is being prepared; poll again.
    Preparing,
    /// Media facts cannot be matched to a playback mode.
    DecisionAmbiguous,
    /// Protected subsystem is unhealthy.
    CircuitOpen,
    /// Upstream collaborator failed.
    UpstreamUnavailable,
    /// Client went away before the intent completed.
    Cancelled,
    /// Unclassified internal failure.
    Internal,
}

impl ProblemCode {
    /// Wire name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ProblemCode::EngineDisabled => "ENGINE_DISABLED",
            ProblemCode::StateUnknown => "STATE_UNKNOWN",
            ProblemCode::NoTuners => "NO_TUNERS",
            ProblemCode::SessionsFull => "SESSIONS_FULL",
            ProblemCode::TranscodesFull => "TRANSCODES_FULL",
            ProblemCode::LeaseBusy => "LEASE_BUSY",
            ProblemCode::InvalidInput => "INVALID_INPUT",
            ProblemCode::NotFound => "NOT_FOUND",
            ProblemCode::Forbidden => "FORBIDDEN",
            ProblemCode::Preparing => "PREPARING",
            ProblemCode::DecisionAmbiguous => "DECISION_AMBIGUOUS",
            ProblemCode::CircuitOpen => "CIRCUIT_OPEN",
            ProblemCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            ProblemCode::Cancelled => "CANCELLED",
            ProblemCode::Internal => "INTERNAL",
        }
    }

    /// Returns true when a caller may retry the same request later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ProblemCode::NoTuners
                | ProblemCode::SessionsFull
                | ProblemCode::TranscodesFull
                | ProblemCode::LeaseBusy
                | ProblemCode::Preparing
                | ProblemCode::CircuitOpen
                | ProblemCode::UpstreamUnavailable
                | ProblemCode::Cancelled
        )
    }
}

impl std::fmt::Display for ProblemCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Problem details body (`application/problem+json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Problem type URI.
    #[serde(rename = "type")]
    pub problem_type: String,
    /// Short human-readable summary.
    pub title: String,
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable code.
    pub code: ProblemCode,
    /// Client-safe explanation.
    pub detail: String,
    /// Advisory retry delay in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u32>,
    /// Correlation ID of the failed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Media type for problem bodies.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

impl Problem {
    /// Create a problem without retry hint.
    pub fn new(code: ProblemCode, status: u16, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: format!("/problems/{}", code.as_str().to_ascii_lowercase()),
            title: title.into(),
            status,
            code,
            detail: detail.into(),
            retry_after_secs: None,
            correlation_id: None,
        }
    }

    /// Attach a retry hint.
    pub fn with_retry_after(mut self, secs: u32) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Attach the request's correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_serialization() {
        let problem = Problem::new(ProblemCode::LeaseBusy, 409, "Lease busy", "service is already starting")
            .with_retry_after(1);
        let json = serde_json::to_value(&problem).unwrap();

        assert_eq!(json["type"], "/problems/lease_busy");
        assert_eq!(json["code"], "LEASE_BUSY");
        assert_eq!(json["status"], 409);
        assert_eq!(json["retryAfterSecs"], 1);
        assert!(json.get("correlationId").is_none());
    }

    #[test]
    fn test_transient_codes() {
        assert!(ProblemCode::SessionsFull.is_transient());
        assert!(ProblemCode::LeaseBusy.is_transient());
        assert!(!ProblemCode::EngineDisabled.is_transient());
        assert!(!ProblemCode::StateUnknown.is_transient());
        assert!(!ProblemCode::NotFound.is_transient());
        assert!(!ProblemCode::DecisionAmbiguous.is_transient());
    }
}
