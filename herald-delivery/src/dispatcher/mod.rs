//! Dispatch orchestration
//!
//! The [`Dispatcher`] owns every piece of shared state the engine needs:
//! admission window, per-backend circuit breakers, dedup cache, status log
//! and deferred queue. Nothing is global; callers share a dispatcher behind
//! an `Arc`.

mod dispatch;
mod drain;

use std::sync::{Arc, atomic::AtomicBool};

use herald_common::{
    IdempotencyKey, Message,
    audit::{AuditConfig, AuditLog},
    internal,
};
use serde::{Deserialize, Serialize};

pub use drain::DrainHandle;

use crate::{
    backend::Backend,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState},
    dedup::DedupCache,
    error::{DispatchError, SystemError},
    queue::{DeferredQueue, QueueConfig},
    rate_limiter::{RateLimitConfig, RateLimitStats, RateLimiter},
    retry::RetryPolicy,
    service::DispatchQueryService,
    status::StatusLog,
    types::StatusRecord,
};

const fn default_enable_queue() -> bool {
    true
}

/// Configuration for a [`Dispatcher`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Whether deferred messages are kept for redelivery
    ///
    /// When disabled, rate-limited and circuit-rejected messages are still
    /// reported as queued but are dropped.
    ///
    /// Default: `true`
    #[serde(default = "default_enable_queue")]
    pub enable_queue: bool,

    /// Admission control
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Per-backend circuit breaking
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy applied to each backend
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Deferred queue behaviour
    #[serde(default)]
    pub queue: QueueConfig,

    /// Audit event emission
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enable_queue: default_enable_queue(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            queue: QueueConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Reliability layer in front of an ordered list of backends
///
/// Backends are tried in order; the first is the primary, each later one a
/// fallback for the one before it.
#[derive(Debug)]
pub struct Dispatcher {
    backends: Vec<Arc<dyn Backend>>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    retry: RetryPolicy,
    dedup: DedupCache,
    status: StatusLog,
    queue: DeferredQueue,
    audit: AuditLog,
    /// Set while a drain loop is running
    draining: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher over `backends`, in priority order
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `backends` is empty.
    pub fn new(
        config: DispatcherConfig,
        backends: Vec<Arc<dyn Backend>>,
    ) -> Result<Self, DispatchError> {
        if backends.is_empty() {
            return Err(SystemError::Configuration(
                "at least one backend is required".to_string(),
            )
            .into());
        }

        internal!(
            level = INFO,
            backends = ?backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            enable_queue = config.enable_queue,
            max_requests = config.rate_limit.max_requests,
            window_ms = config.rate_limit.window_ms,
            failure_threshold = config.circuit_breaker.failure_threshold,
            cooldown_ms = config.circuit_breaker.cooldown_ms,
            max_attempts = config.retry.max_attempts,
            "Initialising dispatcher"
        );

        Ok(Self {
            backends,
            rate_limiter: RateLimiter::new(&config.rate_limit),
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker),
            retry: config.retry,
            dedup: DedupCache::new(),
            status: StatusLog::new(),
            queue: DeferredQueue::new(config.enable_queue, config.queue),
            audit: AuditLog::new(config.audit),
            draining: AtomicBool::new(false),
        })
    }

    /// Backends in the order they are tried
    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// Access to the circuit breakers (for monitoring and tests)
    pub const fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }
}

impl DispatchQueryService for Dispatcher {
    fn status(&self, key: &IdempotencyKey) -> Option<StatusRecord> {
        self.status.get(key)
    }

    fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn queue_enabled(&self) -> bool {
        self.queue.is_enabled()
    }

    fn is_draining(&self) -> bool {
        self.draining.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn circuit_state(&self, backend: &str) -> CircuitState {
        self.circuit_breaker.state(backend)
    }

    fn circuit_stats(&self, backend: &str) -> CircuitBreakerStats {
        self.circuit_breaker.stats(backend)
    }

    fn rate_limit_stats(&self) -> RateLimitStats {
        self.rate_limiter.stats()
    }

    fn dedup_len(&self) -> usize {
        self.dedup.len()
    }

    fn dead_letters(&self) -> Vec<Message> {
        self.queue.dead_letters()
    }
}
