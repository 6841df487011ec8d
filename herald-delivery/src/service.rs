//! Service trait abstraction for dispatcher state
//!
//! Decouples monitoring and operator tooling from the concrete
//! [`Dispatcher`](crate::Dispatcher), so they can be handed a
//! `&dyn DispatchQueryService` and tested against a mock.

use herald_common::{IdempotencyKey, Message};

use crate::{
    circuit_breaker::{CircuitBreakerStats, CircuitState},
    rate_limiter::RateLimitStats,
    types::StatusRecord,
};

/// Read-only view of dispatcher state
///
/// # Example
///
/// ```rust,ignore
/// fn report_depth(service: &dyn DispatchQueryService) -> usize {
///     service.queue_len()
/// }
/// ```
pub trait DispatchQueryService: Send + Sync {
    /// Latest status record for a message
    ///
    /// Returns `None` if the key has never been dispatched.
    fn status(&self, key: &IdempotencyKey) -> Option<StatusRecord>;

    /// Number of messages waiting in the deferred queue
    fn queue_len(&self) -> usize;

    /// Whether the deferred queue was enabled at construction
    fn queue_enabled(&self) -> bool;

    /// Whether a drain loop is currently running
    fn is_draining(&self) -> bool;

    /// Current circuit state for a backend
    ///
    /// Backends that have never been called report [`CircuitState::Closed`].
    fn circuit_state(&self, backend: &str) -> CircuitState;

    fn circuit_stats(&self, backend: &str) -> CircuitBreakerStats;

    fn rate_limit_stats(&self) -> RateLimitStats;

    /// Number of idempotency keys the dedup cache has seen
    ///
    /// Counts every key that reached a dispatch, including keys whose
    /// dispatch failed and was never cached as delivered.
    fn dedup_len(&self) -> usize;

    /// Messages that exceeded the requeue limit, oldest first
    fn dead_letters(&self) -> Vec<Message>;
}
