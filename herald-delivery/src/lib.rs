//! Dispatch reliability engine
//!
//! Sends messages to an ordered list of unreliable backends with at most one
//! effective delivery per idempotency key. Each dispatch passes through:
//!
//! - **Admission**: a sliding-window [`RateLimiter`]
//! - **Deduplication**: the [`DedupCache`] of first successful outcomes
//! - **Fault isolation**: a per-backend [`CircuitBreaker`]
//! - **Retry**: bounded exponential backoff ([`RetryPolicy`])
//! - **Fallback**: the next backend in order
//!
//! Messages that cannot proceed now are held in the [`DeferredQueue`] and
//! resubmitted by the drain loop ([`Dispatcher::start_queue`] or
//! [`Dispatcher::serve`]).

pub mod backend;
pub mod circuit_breaker;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod rate_limiter;
pub mod retry;
pub mod service;
pub mod status;
pub mod types;

pub use backend::{Backend, Receipt, SimulatedBackend, SimulatedBackendConfig};
pub use circuit_breaker::{
    BackendCircuitBreakerConfig, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats,
    CircuitState,
};
pub use dedup::{DedupCache, DedupSlot};
pub use dispatcher::{Dispatcher, DispatcherConfig, DrainHandle};
pub use error::{BackendError, DispatchError, RetryError, SystemError};
pub use queue::{DeferredQueue, Enqueued, QueueConfig};
pub use rate_limiter::{RateLimitConfig, RateLimitStats, RateLimiter};
pub use retry::{Retried, RetryPolicy, execute_with_backoff};
pub use service::DispatchQueryService;
pub use status::StatusLog;
pub use types::{DispatchOutcome, DispatchStatus, RecordStatus, StatusRecord};
