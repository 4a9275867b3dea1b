//! Server-authoritative media facts.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::PlaybackError;
use crate::context::RequestContext;

/// Lifecycle of a media artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaState {
    Preparing,
    Ready,
    Failed,
    NotFound,
}

/// Container and codec facts for one recording or channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTruth {
    pub state: MediaState,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub video_codec: String,
    #[serde(default)]
    pub audio_codec: String,
    /// The HLS playlist already exists on disk.
    #[serde(default)]
    pub playlist_ready: bool,
}

impl MediaTruth {
    pub fn ready(container: &str, video_codec: &str, audio_codec: &str) -> Self {
        Self {
            state: MediaState::Ready,
            container: container.to_string(),
            video_codec: video_codec.to_string(),
            audio_codec: audio_codec.to_string(),
            playlist_ready: false,
        }
    }

    pub fn with_state(state: MediaState) -> Self {
        Self {
            state,
            container: String::new(),
            video_codec: String::new(),
            audio_codec: String::new(),
            playlist_ready: false,
        }
    }
}

/// Source of [`MediaTruth`].
#[async_trait]
pub trait MediaTruthProvider: Send + Sync {
    /// Facts for `id`. Unknown IDs are reported as [`MediaState::NotFound`],
    /// errors are reserved for lookup failures.
    async fn get_media_truth(&self, ctx: &RequestContext, id: &str) -> Result<MediaTruth, PlaybackError>;
}

/// In-memory catalog filled by the library scanner.
#[derive(Default)]
pub struct CatalogTruthProvider {
    entries: RwLock<HashMap<String, MediaTruth>>,
}

impl CatalogTruthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the facts for `id`.
    pub fn upsert(&self, id: &str, truth: MediaTruth) {
        self.entries.write().insert(id.to_string(), truth);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[async_trait]
impl MediaTruthProvider for CatalogTruthProvider {
    async fn get_media_truth(&self, ctx: &RequestContext, id: &str) -> Result<MediaTruth, PlaybackError> {
        if ctx.is_cancelled() {
            return Err(PlaybackError::Upstream("request cancelled".to_string()));
        }
        Ok(self
            .entries
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| MediaTruth::with_state(MediaState::NotFound)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_lookup() {
        let catalog = CatalogTruthProvider::new();
        catalog.upsert("rec-1", MediaTruth::ready("mp4", "h264", "aac"));
        let ctx = RequestContext::new();

        let truth = catalog.get_media_truth(&ctx, "rec-1").await.unwrap();
        assert_eq!(truth.state, MediaState::Ready);
        assert_eq!(truth.container, "mp4");

        let missing = catalog.get_media_truth(&ctx, "rec-2").await.unwrap();
        assert_eq!(missing.state, MediaState::NotFound);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_lookup_fails() {
        let catalog = CatalogTruthProvider::new();
        let ctx = RequestContext::new();
        ctx.cancel.cancel();
        assert!(matches!(
            catalog.get_media_truth(&ctx, "rec-1").await,
            Err(PlaybackError::Upstream(_))
        ));
    }

    #[test]
    fn test_state_wire_names() {
        let truth: MediaTruth = serde_json::from_str(r#"{"state":"not-found"}"#).unwrap();
        assert_eq!(truth.state, MediaState::NotFound);
    }
}
