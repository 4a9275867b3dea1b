//! Message type definitions for the xg2g gateway protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Header carrying the client idempotency key. Takes precedence over the body field.
pub const HEADER_IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Header carrying the advisory retry delay in seconds.
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Header carrying the request correlation ID.
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-ID";

/// Event topic for session start requests.
pub const EVENT_START_SESSION: &str = "session.start";

/// Event topic for session stop requests.
pub const EVENT_STOP_SESSION: &str = "session.stop";

/// Intent type carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentType {
    /// Start a new playback session.
    #[serde(rename = "stream.start")]
    StreamStart,
    /// Stop an existing playback session.
    #[serde(rename = "stream.stop")]
    StreamStop,
}

/// Playback mode requested through `params.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentMode {
    /// Live TV from a tuner.
    Live,
    /// Recording playback (not admitted through intents).
    Recording,
}

impl IntentMode {
    /// Wire name of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            IntentMode::Live => "live",
            IntentMode::Recording => "recording",
        }
    }

    /// Parse a mode string case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("live") {
            Ok(IntentMode::Live)
        } else if raw.eq_ignore_ascii_case("recording") {
            Ok(IntentMode::Recording)
        } else {
            Err(ProtocolError::UnsupportedMode(raw.to_string()))
        }
    }
}

/// Body of `POST /intents`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    /// Intent type; defaults to `stream.start`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub intent_type: Option<IntentType>,
    /// Receiver service reference of the channel.
    #[serde(default)]
    pub service_ref: String,
    /// Profile identifier.
    #[serde(rename = "profileID", alias = "profileId", default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    /// Legacy profile field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Body-supplied idempotency key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Client correlation ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Session to stop (stop intents only).
    #[serde(rename = "sessionID", alias = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form parameters (`mode`, `transcode`).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl IntentRequest {
    /// Effective intent type.
    pub fn intent_type(&self) -> IntentType {
        self.intent_type.unwrap_or(IntentType::StreamStart)
    }

    /// Effective playback mode; a missing mode means live.
    pub fn mode(&self) -> Result<IntentMode, ProtocolError> {
        match self.params.get("mode").map(|m| m.trim()) {
            None | Some("") => Ok(IntentMode::Live),
            Some(raw) => IntentMode::parse(raw),
        }
    }

    /// Whether the caller asked for a server-side transcode.
    pub fn wants_transcode(&self) -> bool {
        self.params
            .get("transcode")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }

    /// Canonical profile ID, reconciling `profileID` and legacy `profile`.
    ///
    /// Returns the profile and whether the legacy field was used.
    pub fn canonical_profile(&self) -> Result<(Option<String>, bool), ProtocolError> {
        let id = self.profile_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let legacy = self.profile.as_deref().map(str::trim).filter(|s| !s.is_empty());
        match (id, legacy) {
            (Some(a), Some(b)) if a != b => Err(ProtocolError::ProfileMismatch),
            (Some(a), _) => Ok((Some(a.to_string()), false)),
            (None, Some(b)) => Ok((Some(b.to_string()), true)),
            (None, None) => Ok((None, false)),
        }
    }
}

/// Body of a `202 Accepted` intent response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResponse {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub status: String,
    #[serde(rename = "correlationID")]
    pub correlation_id: String,
}

impl IntentResponse {
    /// Build an accepted response.
    pub fn accepted(session_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: "accepted".to_string(),
            correlation_id: correlation_id.into(),
        }
    }
}

/// Session lifecycle: `starting -> (ready | failed | cancelled | ended)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Ready,
    Failed,
    Cancelled,
    Ended,
}

impl SessionState {
    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
            SessionState::Ended => "ended",
        }
    }

    /// Parse a stored state string.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        match raw {
            "starting" => Ok(SessionState::Starting),
            "ready" => Ok(SessionState::Ready),
            "failed" => Ok(SessionState::Failed),
            "cancelled" => Ok(SessionState::Cancelled),
            "ended" => Ok(SessionState::Ended),
            other => Err(ProtocolError::UnknownSessionState(other.to_string())),
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Cancelled | SessionState::Ended)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        match self {
            SessionState::Starting => next != SessionState::Starting,
            SessionState::Ready => next.is_terminal(),
            _ => false,
        }
    }
}

/// Payload published on [`EVENT_START_SESSION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionEvent {
    pub session_id: String,
    pub service_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub correlation_id: String,
    /// Tuner slot reserved for the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuner_slot: Option<u32>,
    pub wants_transcode: bool,
}

/// Payload published on [`EVENT_STOP_SESSION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSessionEvent {
    pub session_id: String,
    pub correlation_id: String,
    pub reason: String,
}

/// Delivery strategy chosen by the playback decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Source is played unmodified.
    DirectPlay,
    /// Container is remuxed, streams are copied.
    DirectStream,
    /// Audio and/or video is re-encoded.
    Transcode,
    /// Media cannot be played.
    Error,
}

/// Protocol or artifact the client should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackProtocol {
    Mp4,
    Hls,
    None,
}

impl PlaybackProtocol {
    /// Map a client protocol hint to a protocol; anything but HLS is progressive MP4.
    pub fn from_hint(hint: &str) -> Self {
        if hint.trim().eq_ignore_ascii_case("hls") {
            PlaybackProtocol::Hls
        } else {
            PlaybackProtocol::Mp4
        }
    }
}

/// Stable, explainable reason attached to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    DirectPlayMatch,
    DirectStreamMatch,
    TranscodeVideo,
    TranscodeAudio,
    SafariDirectMp4,
    SafariTsNeedsHls,
    ChromeDirectMp4,
    TranscodeRequired,
    UnknownContainer,
    ForceHls,
    ProbeFailed,
}

impl ReasonCode {
    /// Wire name of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::DirectPlayMatch => "direct_play_match",
            ReasonCode::DirectStreamMatch => "direct_stream_match",
            ReasonCode::TranscodeVideo => "transcode_video",
            ReasonCode::TranscodeAudio => "transcode_audio",
            ReasonCode::SafariDirectMp4 => "safari_direct_mp4",
            ReasonCode::SafariTsNeedsHls => "safari_ts_needs_hls",
            ReasonCode::ChromeDirectMp4 => "chrome_direct_mp4",
            ReasonCode::TranscodeRequired => "transcode_required",
            ReasonCode::UnknownContainer => "unknown_container",
            ReasonCode::ForceHls => "force_hls",
            ReasonCode::ProbeFailed => "probe_failed",
        }
    }

    /// Human-readable summary used in diagnostics.
    pub fn summary(self) -> &'static str {
        match self {
            ReasonCode::DirectPlayMatch => "direct play: container and codecs supported",
            ReasonCode::DirectStreamMatch => "direct stream: remux container only",
            ReasonCode::TranscodeVideo => "transcode: video",
            ReasonCode::TranscodeAudio => "transcode: audio",
            ReasonCode::SafariDirectMp4 => "direct play: safari native mp4",
            ReasonCode::SafariTsNeedsHls => "transcode: safari needs hls for transport streams",
            ReasonCode::ChromeDirectMp4 => "direct play: chrome compatible mp4",
            ReasonCode::TranscodeRequired => "transcode: client cannot play source",
            ReasonCode::UnknownContainer => "transcode: unknown container",
            ReasonCode::ForceHls => "transcode: hls forced by policy",
            ReasonCode::ProbeFailed => "error: media unusable",
        }
    }
}
