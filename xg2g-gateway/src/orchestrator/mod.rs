//! Intent handling: the entry point that composes admission, breakers,
//! leases, the state store and the event bus.
//!
//! A start intent goes through these steps, stopping at the first failure:
//!
//! 1. validate the request and resolve the idempotency key
//! 2. replay an existing session for a known key
//! 3. refuse when no tuner slot is configured
//! 4. admission check against the live counters
//! 5. transcoder breaker check (transcode intents only)
//! 6. reserve the service dedup lease and a tuner slot
//! 7. persist the session and its idempotency key, publish `session.start`
//!
//! Every lease taken in step 6 is released again when a later step fails or
//! the client has gone away.

mod error;
mod intent;
mod session;

pub use error::IntentError;
pub use intent::Accepted;

use std::fmt::Display;
use std::sync::Arc;

use log::error;

use crate::admission::{AdmissionController, AdmissionLimits, RuntimeCounters};
use crate::context::RequestContext;
use crate::events::EventBus;
use crate::lease::LeaseManager;
use crate::metrics::GatewayMetrics;
use crate::resilience::BreakerRegistry;
use crate::store::{StateStore, StoreError};

/// Static orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Tuner slot indexes, tried in order.
    pub tuner_slots: Vec<u32>,
    /// Retry hint for lease conflicts.
    pub retry_after_secs: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tuner_slots: vec![0],
            retry_after_secs: 1,
        }
    }
}

/// Handles start and stop intents and executor state reports.
pub struct Orchestrator {
    config: OrchestratorConfig,
    admission: AdmissionController,
    counters: Arc<RuntimeCounters>,
    leases: Arc<LeaseManager>,
    store: Arc<dyn StateStore>,
    bus: Arc<dyn EventBus>,
    breakers: Arc<BreakerRegistry>,
    metrics: Arc<GatewayMetrics>,
}

impl Orchestrator {
    /// Create a new orchestrator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        admission: AdmissionController,
        counters: Arc<RuntimeCounters>,
        leases: Arc<LeaseManager>,
        store: Arc<dyn StateStore>,
        bus: Arc<dyn EventBus>,
        breakers: Arc<BreakerRegistry>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            config,
            admission,
            counters,
            leases,
            store,
            bus,
            breakers,
            metrics,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn counters(&self) -> &RuntimeCounters {
        &self.counters
    }

    pub fn limits(&self) -> &AdmissionLimits {
        self.admission.limits()
    }
}

/// Log an unexpected failure and turn it into an opaque internal error.
fn internal(ctx: &RequestContext, what: &str, err: impl Display) -> IntentError {
    error!("[Intent] {} {} failed: {}", ctx.correlation_id, what, err);
    IntentError::Internal(format!("{}: {}", what, err))
}

/// Map a store error, keeping the kinds a client can act on.
fn store_error(ctx: &RequestContext, what: &str, err: StoreError) -> IntentError {
    match err {
        StoreError::SessionNotFound(id) => IntentError::NotFound(id),
        StoreError::InvalidTransition { from, to } => IntentError::InvalidTransition { from, to },
        other => internal(ctx, what, other),
    }
}
