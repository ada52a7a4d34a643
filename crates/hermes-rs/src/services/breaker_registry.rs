//! Central registry of circuit breakers, keyed by route or connection id.
//!
//! The registry creates breakers on demand with shared default parameters
//! and owns the path classification policy that decides which request paths
//! are gated at all.

use crate::models::settings::BreakerSettings;
use crate::services::circuit_breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState};
use ahash::{AHashMap, AHashSet};
use log::{debug, info};
use serde::Serialize;
use std::sync::{Arc, RwLock};

/// Aggregate health view over every breaker in the registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryHealth {
    /// True iff no breaker is currently Open.
    pub is_healthy: bool,
    pub open: usize,
    pub half_open: usize,
    pub closed: usize,
    pub total: usize,
}

/// Name -> breaker map with get-or-create semantics and path classification.
///
/// Breakers are never destroyed once created; `reset` / `reset_all` zero
/// them in place so long-lived references held by send channels stay valid.
///
/// # Examples
///
/// ```rust
/// use hermes_rs::services::breaker_registry::BreakerRegistry;
/// use hermes_rs::services::circuit_breaker::CircuitBreakerConfig;
///
/// let registry = BreakerRegistry::new(
///     CircuitBreakerConfig::default(),
///     vec!["/api/".to_string()],
///     vec!["/api/health".to_string()],
/// );
/// assert!(registry.is_path_protected("/api/orders"));
/// assert!(!registry.is_path_protected("/api/health"));
/// ```
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: RwLock<AHashMap<String, Arc<CircuitBreaker>>>,
    defaults: CircuitBreakerConfig,
    prevention_prefixes: Vec<String>,
    exclude_paths: AHashSet<String>,
}

impl BreakerRegistry {
    pub fn new(
        defaults: CircuitBreakerConfig,
        prevention_prefixes: Vec<String>,
        exclude_paths: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            breakers: RwLock::new(AHashMap::new()),
            defaults,
            prevention_prefixes,
            exclude_paths: exclude_paths.into_iter().collect(),
        })
    }

    /// Builds a registry from the `breaker` configuration section.
    pub fn from_settings(settings: &BreakerSettings) -> Arc<Self> {
        Self::new(
            CircuitBreakerConfig {
                failure_threshold: settings.failure_threshold,
                success_threshold: settings.success_threshold,
                volume_threshold: settings.volume_threshold,
                timeout: settings.timeout,
            },
            settings.prevention_paths.clone(),
            settings.exclude_paths.clone(),
        )
    }

    /// Returns the breaker registered under `name`, creating it with the
    /// registry defaults on first mention.
    ///
    /// Concurrent callers racing on an unseen name all observe the same
    /// instance: the fast path is a shared read, the slow path re-checks
    /// under the write lock before inserting.
    pub fn get_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.read_map().get(name) {
            return breaker.clone();
        }
        let mut map = self.write_map();
        map.entry(name.to_string())
            .or_insert_with(|| {
                debug!("creating circuit breaker for {}", name);
                CircuitBreaker::new(name.to_string(), self.defaults.clone())
            })
            .clone()
    }

    /// Path classification: exact exclusion wins over prefix protection.
    pub fn is_path_protected(&self, path: &str) -> bool {
        if self.exclude_paths.contains(path) {
            return false;
        }
        self.prevention_prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    pub fn count_open(&self) -> usize {
        self.count_state(CircuitState::Open)
    }

    pub fn count_half_open(&self) -> usize {
        self.count_state(CircuitState::HalfOpen)
    }

    pub fn count_closed(&self) -> usize {
        self.count_state(CircuitState::Closed)
    }

    /// Aggregate health: unhealthy as soon as any breaker is Open.
    pub fn health_status(&self) -> RegistryHealth {
        let map = self.read_map();
        let mut open = 0;
        let mut half_open = 0;
        let mut closed = 0;
        for breaker in map.values() {
            match breaker.state() {
                CircuitState::Open => open += 1,
                CircuitState::HalfOpen => half_open += 1,
                CircuitState::Closed => closed += 1,
            }
        }
        RegistryHealth {
            is_healthy: open == 0,
            open,
            half_open,
            closed,
            total: map.len(),
        }
    }

    /// Per-breaker snapshots, sorted by name for stable output.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> = self.read_map().values().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Resets one breaker back to Closed. Returns false for unknown names.
    pub fn reset_breaker(&self, name: &str) -> bool {
        match self.read_map().get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Resets every registered breaker back to Closed.
    pub fn reset_all(&self) {
        let map = self.read_map();
        for breaker in map.values() {
            breaker.reset();
        }
        info!("reset {} circuit breakers", map.len());
    }

    fn count_state(&self, state: CircuitState) -> usize {
        self.read_map().values().filter(|b| b.state() == state).count()
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, AHashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, AHashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
