//! xg2g-gateway: session admission, leases and playback decisions for a
//! receiver-backed IPTV gateway.
//!
//! Accepts stream intents over HTTP, admits them against tuner and
//! transcode capacity, deduplicates them through leases and hands accepted
//! sessions to the execution layer as `session.start` events.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;

mod admission;
mod config;
mod context;
mod events;
mod lease;
mod logging;
mod metrics;
mod orchestrator;
mod playback;
mod resilience;
mod store;
mod web;

use admission::{AdmissionController, RuntimeCounters};
use config::{Args, GatewayConfig};
use events::BroadcastBus;
use lease::LeaseManager;
use metrics::GatewayMetrics;
use orchestrator::{Orchestrator, OrchestratorConfig};
use playback::{CatalogTruthProvider, HeaderProfileResolver, PlaybackDecisionEngine};
use resilience::{BreakerRegistry, SystemClock};
use store::{MemoryStore, SqliteStore, StateStore};
use web::WebState;

/// Buffered events per bus subscriber.
const EVENT_BUS_CAPACITY: usize = 256;

/// Log every event handed to the execution layer.
fn spawn_event_logger(bus: &BroadcastBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => info!("[Events] {} {}", event.topic, event.payload),
                Err(RecvError::Lagged(skipped)) => warn!("[Events] Logger lagged, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
        debug!("[Events] Bus closed");
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Command line > config file > defaults
    let config = match GatewayConfig::load(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    logging::init_logging(
        &config.log_dir,
        config.log_retention_days,
        config.verbose,
        config.log_level.as_deref(),
    )
    .expect("Failed to initialize logging");

    // State store
    let store: Arc<dyn StateStore> = if config.memory_store {
        info!("Using in-memory state store");
        Arc::new(MemoryStore::new())
    } else {
        info!("Opening database: {:?}", config.database);
        match SqliteStore::open(&config.database) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to open database: {}", e);
                return Err(e.into());
            }
        }
    };

    // Leases of a previous process are stale by definition.
    match store.delete_all_leases() {
        Ok(0) => {}
        Ok(n) => info!("Removed {} stale leases", n),
        Err(e) => {
            error!("Failed to clear stale leases: {}", e);
            return Err(e.into());
        }
    }

    let bus = Arc::new(BroadcastBus::new(EVENT_BUS_CAPACITY));
    spawn_event_logger(&bus);

    let metrics = GatewayMetrics::new();
    let breakers = Arc::new(BreakerRegistry::new(
        config.breaker.clone(),
        Arc::new(SystemClock),
        metrics.clone(),
    ));
    let leases = Arc::new(LeaseManager::new(store.clone(), config.lease_ttl, config.idempotency_ttl));

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig {
            tuner_slots: config.tuner_slots.clone(),
            retry_after_secs: config.limits.retry_after_secs,
        },
        AdmissionController::new(config.limits.clone()),
        Arc::new(RuntimeCounters::new()),
        leases,
        store,
        bus,
        breakers.clone(),
        metrics.clone(),
    ));

    let catalog = Arc::new(CatalogTruthProvider::new());
    let playback = Arc::new(PlaybackDecisionEngine::new(
        Arc::new(HeaderProfileResolver::new(config.api_token.clone())),
        catalog.clone(),
        config.server_caps.clone(),
    ));

    info!("xg2g-gateway starting...");
    info!("  Listen address: {}", config.listen);
    info!("  Engine enabled: {}", config.limits.engine_enabled);
    info!("  Tuner slots: {:?}", config.tuner_slots);
    info!(
        "  Limits: sessions={} transcodes={}",
        config.limits.max_sessions, config.limits.max_transcodes
    );
    info!(
        "  Lease TTL: {}s, idempotency TTL: {}s",
        config.lease_ttl.as_secs(),
        config.idempotency_ttl.as_secs()
    );
    if config.tuner_slots.is_empty() {
        warn!("No tuner slots configured; every start intent will be refused");
    }

    if config.metrics_interval_secs > 0 {
        let metrics = metrics.clone();
        let period = Duration::from_secs(config.metrics_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                metrics.print_report();
            }
        });
    }

    let state = Arc::new(WebState::new(orchestrator, playback, catalog, breakers, metrics.clone()));

    tokio::select! {
        result = web::start_web_server(config.listen, state) => {
            if let Err(e) = result {
                error!("Web server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    metrics.print_report();
    info!("xg2g-gateway stopped");
    Ok(())
}
