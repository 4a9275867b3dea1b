//! User-agent driven playback table for paths without a truth lookup.

use serde::{Deserialize, Serialize};
use xg2g_protocol::{PlaybackMode, PlaybackProtocol, ReasonCode};

use super::capabilities::normalize;
use super::profile::{is_chrome, is_safari};

/// Players that handle any container natively.
const NATIVE_PLAYERS: [&str; 4] = ["vlc", "kodi", "mpv", "lavf"];

/// Containers generic browsers cannot play progressively.
const INCOMPATIBLE_CONTAINERS: [&str; 4] = ["mpegts", "ts", "mkv", "webm"];

/// Client as seen from its user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientProfile {
    pub user_agent: String,
    pub is_safari: bool,
    pub is_chrome: bool,
}

impl ClientProfile {
    pub fn from_user_agent(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            is_safari: is_safari(user_agent),
            is_chrome: is_chrome(user_agent),
        }
    }

    fn is_native_player(&self) -> bool {
        let ua = self.user_agent.to_ascii_lowercase();
        NATIVE_PLAYERS.iter().any(|p| ua.contains(p))
    }
}

/// Probed media file facts.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    #[serde(rename = "path")]
    pub abs_path: String,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub video_codec: String,
    #[serde(default)]
    pub audio_codec: String,
    #[serde(default)]
    pub duration_secs: f64,
}

/// Server policy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub force_hls: bool,
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDecision {
    pub mode: PlaybackMode,
    pub artifact: PlaybackProtocol,
    pub reason: ReasonCode,
}

impl ClientDecision {
    fn new(mode: PlaybackMode, artifact: PlaybackProtocol, reason: ReasonCode) -> Self {
        Self { mode, artifact, reason }
    }

    fn direct_mp4(reason: ReasonCode) -> Self {
        Self::new(PlaybackMode::DirectPlay, PlaybackProtocol::Mp4, reason)
    }

    fn hls(reason: ReasonCode) -> Self {
        Self::new(PlaybackMode::Transcode, PlaybackProtocol::Hls, reason)
    }
}

/// Decide how a client plays a file. Pure function of its inputs; every
/// branch carries its own reason.
pub fn decide(client: &ClientProfile, media: &MediaInfo, policy: Policy) -> ClientDecision {
    if media.abs_path.trim().is_empty() {
        return ClientDecision::new(PlaybackMode::Error, PlaybackProtocol::None, ReasonCode::ProbeFailed);
    }
    if policy.force_hls {
        return ClientDecision::hls(ReasonCode::ForceHls);
    }

    let container = normalize(&media.container);
    let video = normalize(&media.video_codec);
    let audio = normalize(&media.audio_codec);

    if client.is_safari {
        return match container.as_str() {
            "mp4" => ClientDecision::direct_mp4(ReasonCode::SafariDirectMp4),
            "mpegts" | "ts" => ClientDecision::hls(ReasonCode::SafariTsNeedsHls),
            _ => ClientDecision::hls(ReasonCode::TranscodeRequired),
        };
    }

    if client.is_chrome {
        let video_ok = matches!(video.as_str(), "h264" | "");
        let audio_ok = matches!(audio.as_str(), "aac" | "mp3" | "");
        if container == "mp4" && video_ok && audio_ok {
            return ClientDecision::direct_mp4(ReasonCode::ChromeDirectMp4);
        }
        return ClientDecision::hls(ReasonCode::TranscodeRequired);
    }

    if client.is_native_player() {
        return ClientDecision::direct_mp4(ReasonCode::DirectPlayMatch);
    }

    if container == "mp4" {
        ClientDecision::direct_mp4(ReasonCode::DirectPlayMatch)
    } else if INCOMPATIBLE_CONTAINERS.contains(&container.as_str()) {
        ClientDecision::hls(ReasonCode::TranscodeRequired)
    } else {
        ClientDecision::hls(ReasonCode::UnknownContainer)
    }
}
