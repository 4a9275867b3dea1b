//! Client capability resolution from request headers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;

use super::{PlaybackCapabilities, PlaybackError};
use crate::context::{RequestContext, ANONYMOUS, API_CLIENT};

/// Header carrying an explicit JSON capability set.
pub const HEADER_PLAYBACK_CAPABILITIES: &str = "x-playback-capabilities";

/// Request headers keyed by lower-case name.
pub type Headers = BTreeMap<String, String>;

/// Source of [`PlaybackCapabilities`] for a request.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Principal behind the request, or [`PlaybackError::Forbidden`].
    fn authenticate(&self, headers: &Headers) -> Result<String, PlaybackError>;

    /// Capabilities of the calling client, or [`PlaybackError::Forbidden`].
    async fn resolve(&self, ctx: &RequestContext, headers: &Headers) -> Result<PlaybackCapabilities, PlaybackError>;
}

/// Safari without any Chromium marker.
pub fn is_safari(user_agent: &str) -> bool {
    user_agent.contains("Safari")
        && !user_agent.contains("Chrome")
        && !user_agent.contains("Chromium")
        && !user_agent.contains("Android")
}

/// Chrome, Chromium and Edge.
pub fn is_chrome(user_agent: &str) -> bool {
    user_agent.contains("Chrome") || user_agent.contains("Chromium") || user_agent.contains("Edg")
}

fn set(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Capability set implied by a user agent.
pub fn capabilities_for_user_agent(user_agent: &str) -> PlaybackCapabilities {
    let caps = if is_safari(user_agent) {
        PlaybackCapabilities {
            containers: set(&["mp4", "mpegts"]),
            video_codecs: set(&["h264", "hevc"]),
            audio_codecs: set(&["aac", "mp3"]),
            supports_hls: true,
            device_type: "safari".to_string(),
        }
    } else if is_chrome(user_agent) {
        PlaybackCapabilities {
            containers: set(&["mp4", "webm"]),
            video_codecs: set(&["h264", "vp9", "av1"]),
            audio_codecs: set(&["aac", "opus"]),
            supports_hls: false,
            device_type: "chrome".to_string(),
        }
    } else {
        PlaybackCapabilities {
            containers: set(&["mp4"]),
            video_codecs: set(&["h264"]),
            audio_codecs: set(&["aac"]),
            supports_hls: false,
            device_type: "generic".to_string(),
        }
    };
    caps.canonicalize()
}

/// Resolves capabilities from `Authorization`, `X-Playback-Capabilities`
/// and `User-Agent`.
pub struct HeaderProfileResolver {
    api_token: Option<String>,
}

impl HeaderProfileResolver {
    /// Create a new resolver. With a token set, every request must carry
    /// `Authorization: Bearer <token>`.
    pub fn new(api_token: Option<String>) -> Self {
        Self {
            api_token: api_token.filter(|t| !t.is_empty()),
        }
    }

    fn authorize(&self, headers: &Headers) -> Result<&'static str, PlaybackError> {
        let Some(expected) = &self.api_token else {
            return Ok(ANONYMOUS);
        };
        let presented = headers
            .get("authorization")
            .and_then(|v| v.trim().strip_prefix("Bearer "))
            .map(str::trim);
        match presented {
            Some(token) if token == expected => Ok(API_CLIENT),
            _ => Err(PlaybackError::Forbidden),
        }
    }
}

#[async_trait]
impl ProfileResolver for HeaderProfileResolver {
    fn authenticate(&self, headers: &Headers) -> Result<String, PlaybackError> {
        self.authorize(headers).map(str::to_string)
    }

    async fn resolve(&self, ctx: &RequestContext, headers: &Headers) -> Result<PlaybackCapabilities, PlaybackError> {
        self.authorize(headers)?;
        debug!("[Playback] {} resolving profile for {}", ctx.correlation_id, ctx.principal);

        if let Some(raw) = headers.get(HEADER_PLAYBACK_CAPABILITIES) {
            let caps: PlaybackCapabilities = serde_json::from_str(raw)
                .map_err(|e| PlaybackError::InvalidCapabilities(e.to_string()))?;
            return Ok(caps.canonicalize());
        }

        let user_agent = headers.get("user-agent").map(String::as_str).unwrap_or("");
        let caps = capabilities_for_user_agent(user_agent);
        debug!("[Playback] Profile {} for user agent {:?}", caps.device_type, user_agent);
        Ok(caps)
    }
}
