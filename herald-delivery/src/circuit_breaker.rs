//! Per-backend circuit breaker to isolate failing backends
//!
//! This module implements the circuit breaker pattern so that a backend which
//! is systemically down does not keep absorbing retries (and their backoff
//! latency) for every message.
//!
//! # Circuit Breaker Pattern
//!
//! The circuit breaker has three states:
//! - **Closed**: Normal operation, all requests allowed
//! - **Open**: Circuit tripped due to failures, all requests rejected until the cooldown elapses
//! - **Half-Open**: Testing recovery, exactly one probe request is allowed through
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐  consecutive failures >= threshold  ┌──────┐
//! │ Closed  │ ──────────────────────────────────> │ Open │
//! └─────────┘                                      └──────┘
//!     ^                                               │
//!     │                                               │ Cooldown elapsed
//!     │                                               │ (first caller becomes the probe)
//!     │  Probe succeeds      ┌───────────────┐        v
//!     └──────────────────────│  Half-Open    │<───────┘
//!                            └───────────────┘
//!                                    │
//!                                    │ Probe fails
//!                                    v
//!                              ┌──────┐
//!                              │ Open │
//!                              └──────┘
//! ```
//!
//! # Example
//!
//! ```text
//! Threshold: 3 consecutive failures
//! Cooldown: 5 seconds
//!
//! t=0s:   Closed (normal)
//! t=1s:   3rd failure → Open
//! t=1-6s: All requests rejected
//! t=6s:   First request admitted as probe → Half-Open, others still rejected
//! t=6.1s: Probe succeeds → Closed
//! ```

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use herald_common::internal;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before admitting a probe (milliseconds)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Per-backend circuit breaker overrides
    #[serde(default)]
    pub backend_overrides: ahash::AHashMap<String, BackendCircuitBreakerConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            backend_overrides: ahash::AHashMap::default(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_ms() -> u64 {
    5000
}

/// Per-backend circuit breaker configuration override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCircuitBreakerConfig {
    /// Failure threshold for this backend
    pub failure_threshold: u32,
    /// Cooldown for this backend (milliseconds)
    pub cooldown_ms: u64,
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all requests allowed
    Closed,
    /// Circuit tripped - reject all requests until the cooldown elapses
    Open,
    /// Testing recovery - the single probe is outstanding
    HalfOpen,
}

/// Health state of a single backend
#[derive(Debug)]
struct CircuitBreakerData {
    state: CircuitState,
    consecutive_failures: u32,
    /// When an open circuit may admit its probe
    reopen_at: Option<Instant>,
    config: BackendCircuitBreakerConfig,
}

impl CircuitBreakerData {
    const fn new(config: BackendCircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            reopen_at: None,
            config,
        }
    }

    fn trip(&mut self, backend: &str) {
        self.state = CircuitState::Open;
        self.reopen_at = Some(Instant::now() + Duration::from_millis(self.config.cooldown_ms));
        internal!(
            level = WARN,
            backend = %backend,
            consecutive_failures = self.consecutive_failures,
            threshold = self.config.failure_threshold,
            cooldown_ms = self.config.cooldown_ms,
            "Circuit breaker OPENED - rejecting requests to failing backend"
        );
    }

    /// Check if a request should be allowed, admitting the half-open probe
    /// as a side effect when the cooldown has elapsed
    fn can_request(&mut self, backend: &str) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = self.reopen_at.is_none_or(|at| Instant::now() >= at);
                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                    internal!(
                        level = INFO,
                        backend = %backend,
                        "Circuit breaker entering HALF-OPEN state - admitting probe"
                    );
                }
                cooled_down
            }
            // The probe is already outstanding
            CircuitState::HalfOpen => false,
        }
    }

    /// Returns `true` if the circuit transitioned to Closed (recovered)
    fn on_success(&mut self, backend: &str) -> bool {
        let recovered = self.state != CircuitState::Closed;
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.reopen_at = None;

        if recovered {
            internal!(
                level = INFO,
                backend = %backend,
                "Circuit breaker CLOSED - normal operation resumed"
            );
        }
        recovered
    }

    /// Returns `true` if the circuit transitioned to Open (tripped)
    fn on_failure(&mut self, backend: &str) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::Closed if self.consecutive_failures >= self.config.failure_threshold => {
                self.trip(backend);
                true
            }
            CircuitState::HalfOpen => {
                internal!(
                    level = WARN,
                    backend = %backend,
                    "Circuit breaker probe failed - reopening circuit"
                );
                self.trip(backend);
                true
            }
            CircuitState::Closed | CircuitState::Open => false,
        }
    }
}

/// Circuit breakers for every backend, created on first use
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    breakers: DashMap<Arc<str>, Arc<Mutex<CircuitBreakerData>>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get or create the breaker for a backend
    fn get_breaker(&self, backend: &str) -> Arc<Mutex<CircuitBreakerData>> {
        if let Some(breaker) = self.breakers.get(backend) {
            return Arc::clone(breaker.value());
        }

        self.breakers
            .entry(Arc::from(backend))
            .or_insert_with(|| {
                let config = self
                    .config
                    .backend_overrides
                    .get(backend)
                    .copied()
                    .unwrap_or(BackendCircuitBreakerConfig {
                        failure_threshold: self.config.failure_threshold,
                        cooldown_ms: self.config.cooldown_ms,
                    });

                Arc::new(Mutex::new(CircuitBreakerData::new(config)))
            })
            .clone()
    }

    /// Check if a request may be sent to this backend
    ///
    /// Returns `false` while the circuit is open and cooling down, or while a
    /// half-open probe is outstanding. The first call after the cooldown
    /// returns `true` and moves the circuit to half-open.
    pub fn can_request(&self, backend: &str) -> bool {
        self.get_breaker(backend).lock().can_request(backend)
    }

    /// Record a success: resets the failure count and closes the circuit
    ///
    /// Returns `true` if the circuit recovered from open or half-open
    pub fn on_success(&self, backend: &str) -> bool {
        self.get_breaker(backend).lock().on_success(backend)
    }

    /// Record a failure
    ///
    /// Returns `true` if the circuit transitioned to open
    pub fn on_failure(&self, backend: &str) -> bool {
        self.get_breaker(backend).lock().on_failure(backend)
    }

    /// Get current circuit state for a backend
    pub fn state(&self, backend: &str) -> CircuitState {
        self.get_breaker(backend).lock().state
    }

    /// Get statistics for a backend (for monitoring/debugging)
    pub fn stats(&self, backend: &str) -> CircuitBreakerStats {
        let breaker = self.get_breaker(backend);
        let guard = breaker.lock();
        CircuitBreakerStats {
            state: guard.state,
            consecutive_failures: guard.consecutive_failures,
            reopen_in: guard
                .reopen_at
                .map(|at| at.saturating_duration_since(Instant::now())),
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    /// Current circuit state
    pub state: CircuitState,
    /// Number of consecutive failures
    pub consecutive_failures: u32,
    /// Time left before an open circuit admits its probe
    pub reopen_in: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            cooldown_ms,
            backend_overrides: ahash::AHashMap::default(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_closed_to_open() {
        let breaker = breaker(3, 5000);

        assert_eq!(breaker.state("ProviderA"), CircuitState::Closed);
        assert!(breaker.can_request("ProviderA"));

        assert!(!breaker.on_failure("ProviderA"));
        assert!(!breaker.on_failure("ProviderA"));
        assert_eq!(breaker.state("ProviderA"), CircuitState::Closed);

        assert!(breaker.on_failure("ProviderA"));
        assert_eq!(breaker.state("ProviderA"), CircuitState::Open);
        assert!(!breaker.can_request("ProviderA"));

        // Other backends are unaffected
        assert!(breaker.can_request("ProviderB"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_after_cooldown() {
        let breaker = breaker(2, 5000);

        breaker.on_failure("ProviderA");
        breaker.on_failure("ProviderA");

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(!breaker.can_request("ProviderA"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(breaker.can_request("ProviderA"));
        assert_eq!(breaker.state("ProviderA"), CircuitState::HalfOpen);

        // Only one probe at a time
        assert!(!breaker.can_request("ProviderA"));
        assert!(!breaker.can_request("ProviderA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_half_open_success() {
        let breaker = breaker(2, 100);

        breaker.on_failure("ProviderA");
        breaker.on_failure("ProviderA");
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(breaker.can_request("ProviderA"));
        assert!(breaker.on_success("ProviderA"));
        assert_eq!(breaker.state("ProviderA"), CircuitState::Closed);
        assert_eq!(breaker.stats("ProviderA").consecutive_failures, 0);
        assert!(breaker.can_request("ProviderA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_half_open_failure() {
        let breaker = breaker(2, 100);

        breaker.on_failure("ProviderA");
        breaker.on_failure("ProviderA");
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(breaker.can_request("ProviderA"));

        assert!(breaker.on_failure("ProviderA"));
        assert_eq!(breaker.state("ProviderA"), CircuitState::Open);
        assert!(!breaker.can_request("ProviderA"));

        // Fresh cooldown from the failed probe
        let stats = breaker.stats("ProviderA");
        assert_eq!(stats.reopen_in, Some(Duration::from_millis(100)));
        assert_eq!(stats.consecutive_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let breaker = breaker(3, 5000);

        breaker.on_failure("ProviderA");
        breaker.on_failure("ProviderA");
        assert!(!breaker.on_success("ProviderA"));

        breaker.on_failure("ProviderA");
        breaker.on_failure("ProviderA");
        assert_eq!(breaker.state("ProviderA"), CircuitState::Closed);
        assert_eq!(breaker.stats("ProviderA").consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_while_open_do_not_extend_cooldown() {
        let breaker = breaker(1, 1000);

        breaker.on_failure("ProviderA");
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(!breaker.on_failure("ProviderA"));

        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(breaker.can_request("ProviderA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_override() {
        let mut config = CircuitBreakerConfig::default();
        config.backend_overrides.insert(
            "Fragile".to_string(),
            BackendCircuitBreakerConfig {
                failure_threshold: 1,
                cooldown_ms: 10,
            },
        );
        let breaker = CircuitBreaker::new(config);

        assert!(breaker.on_failure("Fragile"));
        assert!(!breaker.on_failure("Sturdy"));
        assert_eq!(breaker.state("Fragile"), CircuitState::Open);
        assert_eq!(breaker.state("Sturdy"), CircuitState::Closed);
    }
}
