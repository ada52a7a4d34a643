//! Circuit breaker state machine protecting routes and connections.
//!
//! One breaker instance guards one protected route or one WebSocket
//! connection. Failures and successes are counted over live traffic; the
//! breaker trips Open after a run of consecutive failures (once a minimum
//! request volume has been seen), rejects traffic while Open, and probes
//! recovery through a Half-Open trial period.

use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// State of a circuit breaker.
///
/// * `Closed` - normal operation, requests pass through and failures are counted
/// * `Open` - circuit tripped, requests are rejected until the timeout elapses
/// * `HalfOpen` - recovery trial, requests pass through under close watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Tuning parameters for a circuit breaker.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use hermes_rs::services::circuit_breaker::CircuitBreakerConfig;
///
/// let config = CircuitBreakerConfig {
///     failure_threshold: 3,
///     success_threshold: 2,
///     volume_threshold: 5,
///     timeout: Duration::from_secs(30),
/// };
/// assert!(config.failure_threshold < CircuitBreakerConfig::default().failure_threshold);
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open a Closed breaker.
    pub failure_threshold: u32,
    /// Consecutive Half-Open successes required to close.
    pub success_threshold: u32,
    /// Minimum total requests before a Closed breaker may open.
    pub volume_threshold: u64,
    /// Wait in Open before trial traffic is admitted.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            volume_threshold: 10,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Consistent point-in-time snapshot of a breaker's counters.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub failed_requests: u64,
    /// Seconds since the most recent recorded failure, if any.
    pub last_failure_secs_ago: Option<u64>,
    /// Seconds since the most recent recorded success, if any.
    pub last_success_secs_ago: Option<u64>,
    /// Seconds since the breaker last changed state.
    pub last_state_change_secs_ago: u64,
}

// All mutable state lives behind one mutex: operations are O(1) and never
// suspend, snapshots are self-consistent, and the Open -> HalfOpen
// transition inside allow() is single-flight.
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u64,
    failed_requests: u64,
    last_failure_time: Option<Instant>,
    last_success_time: Option<Instant>,
    last_state_change: Instant,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            failed_requests: 0,
            last_failure_time: None,
            last_success_time: None,
            last_state_change: Instant::now(),
        }
    }
}

/// A single circuit breaker instance.
///
/// Outcomes are recorded, never returned: `record_success` and
/// `record_failure` feed the state machine, `allow` answers the admission
/// question. Retrying is the caller's concern; the breaker takes each
/// reported outcome at face value.
///
/// # Examples
///
/// ```rust
/// use hermes_rs::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// let breaker = CircuitBreaker::new("/api/orders".to_string(), CircuitBreakerConfig::default());
/// assert!(breaker.allow());
/// breaker.record_success();
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    /// Creates a new breaker in the Closed state, shared behind an `Arc`.
    pub fn new(name: String, config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            name,
            config,
            core: Mutex::new(BreakerCore::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admission check.
    ///
    /// Closed admits everything. Open rejects until `timeout` has elapsed
    /// since the last failure, at which point the call itself performs the
    /// transition to Half-Open and admits the trial request. Half-Open
    /// admits trial traffic.
    pub fn allow(&self) -> bool {
        let mut core = self.lock();
        match core.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = match core.last_failure_time {
                    Some(last) => last.elapsed() > self.config.timeout,
                    None => true,
                };
                if recovered {
                    self.transition(&mut core, CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Records a successful outcome.
    pub fn record_success(&self) {
        let mut core = self.lock();
        core.total_requests += 1;
        core.failure_count = 0;
        match core.state {
            CircuitState::Closed => {
                core.last_success_time = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                core.last_success_time = Some(Instant::now());
                core.success_count += 1;
                if core.success_count >= self.config.success_threshold {
                    self.transition(&mut core, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                // A rejected caller raced a success report in; counters are
                // already updated and the timer keeps running.
            }
        }
    }

    /// Records a failed outcome.
    pub fn record_failure(&self) {
        let mut core = self.lock();
        core.total_requests += 1;
        core.failed_requests += 1;
        core.failure_count += 1;
        core.success_count = 0;
        core.last_failure_time = Some(Instant::now());
        match core.state {
            CircuitState::Closed => {
                if core.failure_count >= self.config.failure_threshold
                    && core.total_requests >= self.config.volume_threshold
                {
                    self.transition(&mut core, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut core, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consistent snapshot of all counters, taken under one critical section.
    pub fn stats(&self) -> BreakerStats {
        let core = self.lock();
        BreakerStats {
            name: self.name.clone(),
            state: core.state,
            failure_count: core.failure_count,
            success_count: core.success_count,
            total_requests: core.total_requests,
            failed_requests: core.failed_requests,
            last_failure_secs_ago: core.last_failure_time.map(|t| t.elapsed().as_secs()),
            last_success_secs_ago: core.last_success_time.map(|t| t.elapsed().as_secs()),
            last_state_change_secs_ago: core.last_state_change.elapsed().as_secs(),
        }
    }

    /// Forces the breaker back to Closed and zeroes every counter.
    pub fn reset(&self) {
        let mut core = self.lock();
        *core = BreakerCore::new();
        info!("circuit breaker {} reset to closed", self.name);
    }

    // Every state change funnels through here so counters are zeroed and the
    // change is observable as exactly one log event.
    fn transition(&self, core: &mut BreakerCore, next: CircuitState) {
        let prev = core.state;
        core.state = next;
        core.failure_count = 0;
        core.success_count = 0;
        core.last_state_change = Instant::now();
        match next {
            CircuitState::Open => warn!("circuit breaker {} {} -> open", self.name, prev),
            _ => info!("circuit breaker {} {} -> {}", self.name, prev, next),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerCore> {
        // Poisoning only happens if a holder panicked inside an O(1)
        // critical section; the counters remain usable either way.
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure: u32, success: u32, volume: u64, timeout: Duration) -> Arc<CircuitBreaker> {
        CircuitBreaker::new(
            "test".to_string(),
            CircuitBreakerConfig {
                failure_threshold: failure,
                success_threshold: success,
                volume_threshold: volume,
                timeout,
            },
        )
    }

    #[test]
    fn closed_failures_below_volume_stay_closed() {
        let cb = breaker(3, 2, 10, Duration::from_secs(1));
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(1, 2, 1, Duration::from_millis(10));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn stats_snapshot_is_consistent() {
        let cb = breaker(5, 3, 10, Duration::from_secs(1));
        cb.record_success();
        cb.record_failure();
        let stats = cb.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.failure_count, 1);
    }
}
