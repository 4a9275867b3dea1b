//! Truth-based playback decisions.

use std::sync::Arc;

use log::debug;
use serde::Serialize;
use thiserror::Error;
use xg2g_protocol::{PlaybackMode, PlaybackProtocol, Problem, ProblemCode, ReasonCode};

use super::capabilities::normalize;
use super::codec::{select_codec, CodecInput, CodecPath, ServerCapabilities};
use super::profile::{Headers, ProfileResolver};
use super::truth::{MediaState, MediaTruth, MediaTruthProvider};
use super::PlaybackCapabilities;
use crate::context::RequestContext;

/// Codec fact that cannot be verified.
const UNKNOWN_CODEC: &str = "unknown";

/// Seconds a client should wait before polling a preparing artifact.
pub const PREPARING_RETRY_SECS: u32 = 5;

/// Playback resolution errors.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The client may not play anything.
    #[error("Playback forbidden")]
    Forbidden,

    #[error("Media not found")]
    NotFound,

    /// The artifact is being built; poll again.
    #[error("Media is being prepared")]
    Preparing,

    /// Codec facts cannot be verified; no mode is guessed.
    #[error("Media facts are ambiguous")]
    DecisionAmbiguous,

    #[error("Invalid capabilities: {0}")]
    InvalidCapabilities(String),

    /// A collaborator lookup failed.
    #[error("Upstream lookup failed: {0}")]
    Upstream(String),
}

impl PlaybackError {
    /// Client-safe problem body for this error.
    pub fn to_problem(&self) -> Problem {
        match self {
            PlaybackError::Forbidden => {
                Problem::new(ProblemCode::Forbidden, 403, "Forbidden", "playback is not permitted")
            }
            PlaybackError::NotFound => {
                Problem::new(ProblemCode::NotFound, 404, "Not found", "media does not exist")
            }
            PlaybackError::Preparing => {
                Problem::new(ProblemCode::Preparing, 503, "Preparing", "media is being prepared")
                    .with_retry_after(PREPARING_RETRY_SECS)
            }
            PlaybackError::DecisionAmbiguous => Problem::new(
                ProblemCode::DecisionAmbiguous,
                422,
                "Decision ambiguous",
                "media codec facts cannot be verified",
            ),
            PlaybackError::InvalidCapabilities(_) => Problem::new(
                ProblemCode::InvalidInput,
                400,
                "Invalid capabilities",
                "capability header is not valid JSON",
            ),
            PlaybackError::Upstream(_) => Problem::new(
                ProblemCode::UpstreamUnavailable,
                502,
                "Upstream unavailable",
                "media lookup failed",
            ),
        }
    }
}

/// How a client should play a piece of media.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub mode: PlaybackMode,
    pub protocol: PlaybackProtocol,
    pub reason: ReasonCode,
    /// Output video codec when transcoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_video_codec: Option<String>,
}

impl Decision {
    fn new(mode: PlaybackMode, protocol: PlaybackProtocol, reason: ReasonCode) -> Self {
        Self {
            mode,
            protocol,
            reason,
            target_video_codec: None,
        }
    }
}

/// Input of [`PlaybackDecisionEngine::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub recording_id: String,
    pub protocol_hint: String,
    pub headers: Headers,
}

/// Map ready media and a capability set to a decision.
///
/// Same inputs, same output: nothing here reads clocks or shared state.
pub fn decide(truth: &MediaTruth, caps: &PlaybackCapabilities, protocol_hint: &str) -> Result<Decision, PlaybackError> {
    match truth.state {
        MediaState::NotFound => return Err(PlaybackError::NotFound),
        MediaState::Preparing => return Err(PlaybackError::Preparing),
        MediaState::Failed if !truth.playlist_ready => return Err(PlaybackError::Preparing),
        MediaState::Failed | MediaState::Ready => {}
    }

    let container = normalize(&truth.container);
    let video = normalize(&truth.video_codec);
    let audio = normalize(&truth.audio_codec);
    if video == UNKNOWN_CODEC || audio == UNKNOWN_CODEC {
        return Err(PlaybackError::DecisionAmbiguous);
    }

    let caps = caps.clone().canonicalize();
    let video_ok = caps.supports_video(&video);
    let audio_ok = caps.supports_audio(&audio);
    let native = if PlaybackProtocol::from_hint(protocol_hint) == PlaybackProtocol::Hls && caps.supports_hls {
        PlaybackProtocol::Hls
    } else {
        PlaybackProtocol::Mp4
    };

    let decision = match (caps.supports_container(&container), video_ok, audio_ok) {
        (true, true, true) => Decision::new(PlaybackMode::DirectPlay, native, ReasonCode::DirectPlayMatch),
        (false, true, true) => Decision::new(PlaybackMode::DirectStream, native, ReasonCode::DirectStreamMatch),
        (_, false, _) => Decision::new(PlaybackMode::Transcode, PlaybackProtocol::Hls, ReasonCode::TranscodeVideo),
        (_, true, false) => Decision::new(PlaybackMode::Transcode, PlaybackProtocol::Hls, ReasonCode::TranscodeAudio),
    };
    Ok(decision)
}

/// Resolves capabilities and media truth, then applies [`decide`].
pub struct PlaybackDecisionEngine {
    profiles: Arc<dyn ProfileResolver>,
    truth: Arc<dyn MediaTruthProvider>,
    server: ServerCapabilities,
}

impl PlaybackDecisionEngine {
    /// Create a new engine.
    pub fn new(
        profiles: Arc<dyn ProfileResolver>,
        truth: Arc<dyn MediaTruthProvider>,
        server: ServerCapabilities,
    ) -> Self {
        Self { profiles, truth, server }
    }

    /// Decide how the calling client plays `req.recording_id`.
    ///
    /// Collaborators see the context with the authenticated principal.
    pub async fn resolve(&self, ctx: &RequestContext, req: &ResolveRequest) -> Result<Decision, PlaybackError> {
        let principal = self.profiles.authenticate(&req.headers)?;
        let ctx = &ctx.clone().with_principal(principal);
        let caps = self.profiles.resolve(ctx, &req.headers).await?;
        let truth = self.truth.get_media_truth(ctx, &req.recording_id).await?;

        if truth.state == MediaState::Failed && truth.playlist_ready {
            debug!(
                "[Playback] {} stale failed marker on {}, playlist is ready",
                ctx.correlation_id, req.recording_id
            );
        }

        let mut decision = decide(&truth, &caps, &req.protocol_hint)?;
        if decision.mode == PlaybackMode::Transcode && decision.reason == ReasonCode::TranscodeVideo {
            let choice = select_codec(&CodecInput {
                source_codec: truth.video_codec.clone(),
                source_container: truth.container.clone(),
                client_codecs: caps.video_codecs.clone(),
                profile: caps.device_type.clone(),
                server: self.server.clone(),
                ..Default::default()
            });
            if matches!(choice.path, CodecPath::TranscodeCpu | CodecPath::TranscodeHw) {
                decision.target_video_codec = choice.codec;
            }
        }

        debug!(
            "[Playback] {} {} {} -> {:?}/{:?} ({})",
            ctx.correlation_id,
            ctx.principal,
            req.recording_id,
            decision.mode,
            decision.protocol,
            decision.reason.as_str()
        );
        Ok(decision)
    }
}
