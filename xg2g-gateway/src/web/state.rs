//! Web server shared state.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::admission::RuntimeState;
use crate::metrics::GatewayMetrics;
use crate::orchestrator::Orchestrator;
use crate::playback::{CatalogTruthProvider, PlaybackDecisionEngine};
use crate::resilience::BreakerRegistry;

/// Gateway overview served by `GET /api/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub engine_enabled: bool,
    pub tuner_slots: usize,
    pub max_sessions: i64,
    pub max_transcodes: i64,
    pub runtime: RuntimeState,
    pub catalog_entries: usize,
    pub uptime_seconds: u64,
}

/// Shared state for web handlers.
pub struct WebState {
    pub orchestrator: Arc<Orchestrator>,
    pub playback: Arc<PlaybackDecisionEngine>,
    pub catalog: Arc<CatalogTruthProvider>,
    pub breakers: Arc<BreakerRegistry>,
    pub metrics: Arc<GatewayMetrics>,
    /// Server start time.
    pub started_at: Instant,
}

impl WebState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        playback: Arc<PlaybackDecisionEngine>,
        catalog: Arc<CatalogTruthProvider>,
        breakers: Arc<BreakerRegistry>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            orchestrator,
            playback,
            catalog,
            breakers,
            metrics,
            started_at: Instant::now(),
        }
    }

    pub fn stats(&self) -> GatewayStats {
        let tuner_slots = self.orchestrator.config().tuner_slots.len();
        let limits = self.orchestrator.limits();
        GatewayStats {
            engine_enabled: limits.engine_enabled,
            tuner_slots,
            max_sessions: limits.max_sessions,
            max_transcodes: limits.max_transcodes,
            runtime: self.orchestrator.counters().snapshot(tuner_slots),
            catalog_entries: self.catalog.len(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}
