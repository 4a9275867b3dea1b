//! Client playback capability sets.

use serde::{Deserialize, Serialize};

/// What a client can play.
///
/// Use [`PlaybackCapabilities::canonicalize`] before comparing: the string
/// sets are lower-cased, trimmed, deduplicated and sorted so that equal
/// capability sets are byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCapabilities {
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub video_codecs: Vec<String>,
    #[serde(default)]
    pub audio_codecs: Vec<String>,
    #[serde(default, rename = "supportsHLS", alias = "supportsHls")]
    pub supports_hls: bool,
    #[serde(default)]
    pub device_type: String,
}

fn canonical_set(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = values
        .into_iter()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

impl PlaybackCapabilities {
    /// Canonical form of this capability set.
    pub fn canonicalize(self) -> Self {
        Self {
            containers: canonical_set(self.containers),
            video_codecs: canonical_set(self.video_codecs),
            audio_codecs: canonical_set(self.audio_codecs),
            supports_hls: self.supports_hls,
            device_type: self.device_type.trim().to_ascii_lowercase(),
        }
    }

    pub fn supports_container(&self, container: &str) -> bool {
        contains(&self.containers, container)
    }

    /// An empty codec fact places no requirement on the client.
    pub fn supports_video(&self, codec: &str) -> bool {
        codec.is_empty() || contains(&self.video_codecs, codec)
    }

    pub fn supports_audio(&self, codec: &str) -> bool {
        codec.is_empty() || contains(&self.audio_codecs, codec)
    }
}

fn contains(set: &[String], value: &str) -> bool {
    set.binary_search_by(|probe| probe.as_str().cmp(value)).is_ok()
}

/// Lower-cased, trimmed media fact.
pub fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
