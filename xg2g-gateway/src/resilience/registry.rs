//! Process-lifetime breaker registry, constructed in `main` and injected.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use super::clock::Clock;
use crate::metrics::GatewayMetrics;

/// Breaker guarding the transcoder process pool.
pub const TRANSCODER_BREAKER: &str = "transcoder";

/// Name-keyed set of breakers sharing one configuration.
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<GatewayMetrics>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create a new empty registry.
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            config,
            clock,
            metrics,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the breaker for `name`, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(cb) = self.breakers.read().get(name) {
            return cb.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.config.clone(),
                    self.clock.clone(),
                    self.metrics.clone(),
                ))
            })
            .clone()
    }

    /// Get an existing breaker.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Snapshots of all breakers, sorted by name.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.breakers.read().values().cloned().collect();
        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|cb| cb.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
