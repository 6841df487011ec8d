//! Typed error handling for dispatch operations.
//!
//! This module provides structured error types that distinguish between:
//! - Client errors (missing idempotency key) - never retried
//! - Recoverable conditions (rate limit, open circuit) - absorbed by the queue
//! - Backend failures - retried with backoff, then fall back to the next backend
//! - Terminal exhaustion - surfaced to the caller as a failure outcome
//!
//! None of these cross the dispatcher boundary as `Err`; they are folded into
//! a [`DispatchOutcome`](crate::DispatchOutcome) instead.

use std::sync::Arc;

use thiserror::Error;

/// Error returned by a single backend `send`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused the message.
    #[error("Rejected by {backend}: {reason}")]
    Rejected { backend: Arc<str>, reason: String },

    /// The backend could not be reached or is overloaded.
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: Arc<str>, reason: String },

    /// The backend did not answer in time.
    #[error("{backend} timed out")]
    Timeout { backend: Arc<str> },
}

/// Returned by the retry executor once every attempt has failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Retries exhausted after {attempts} attempt(s){}", describe_cause(.last_error.as_ref()))]
pub struct RetryError {
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// Cause of the final failure, `None` when no attempt was allowed.
    pub last_error: Option<BackendError>,
}

fn describe_cause(cause: Option<&BackendError>) -> String {
    cause.map_or_else(String::new, |e| format!(": {e}"))
}

/// Top-level dispatch error type.
///
/// Mirrors the failure taxonomy of the engine so each condition can be
/// classified before it is converted into an outcome.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The message has no idempotency key.
    #[error("Idempotency key is required")]
    ClientError,

    /// The admission controller denied the request.
    #[error("Rate limit hit")]
    AdmissionDenied,

    /// The circuit breaker for a backend is open.
    #[error("{backend} is temporarily disabled")]
    CircuitOpen { backend: Arc<str> },

    /// A backend exhausted its retry budget.
    #[error("{backend} failed: {source}")]
    BackendFailure {
        backend: Arc<str>,
        #[source]
        source: RetryError,
    },

    /// Every backend was tried and none accepted the message.
    #[error("All backends failed after {attempts} attempt(s)")]
    AllBackendsExhausted { attempts: u32 },

    /// The message exceeded its requeue limit.
    #[error("Requeue limit reached after {retry_count} enqueue(s)")]
    RequeueLimitReached { retry_count: u32 },

    /// Lifecycle or configuration misuse.
    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// System-level errors that indicate misuse of the engine.
#[derive(Debug, Error)]
pub enum SystemError {
    /// The deferred queue was disabled at construction.
    #[error("Deferred queue is disabled")]
    QueueDisabled,

    /// The drain loop is already running.
    #[error("Deferred queue drain is already running")]
    AlreadyRunning,

    /// The dispatcher has no backends configured.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DispatchError {
    /// Returns `true` if the caller supplied an invalid message.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::ClientError)
    }

    /// Returns `true` if the condition is absorbed by the deferred queue.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AdmissionDenied | Self::CircuitOpen { .. } | Self::BackendFailure { .. }
        )
    }

    /// Returns `true` if the condition is surfaced to the caller as a failure.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClientError | Self::AllBackendsExhausted { .. } | Self::RequeueLimitReached { .. }
        )
    }
}
