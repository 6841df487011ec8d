//! Audit logging for message dispatch lifecycle events
//!
//! Every state transition that the dispatcher records in its status log is
//! also emitted here as a structured `tracing` event, so operators can follow
//! a message end to end without querying the process.
//!
//! ## Audit Events
//!
//! - `MessageQueued`: Message deferred (rate limit or open circuit)
//! - `DispatchAttempt`: A backend `send` was invoked
//! - `DispatchSuccess`: A backend accepted the message
//! - `DispatchFailure`: Every backend was exhausted
//! - `DuplicateSuppressed`: A repeated key was answered from the cache
//! - `DeadLettered`: The message exceeded its requeue limit

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging for dispatch lifecycle events
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const fn default_true() -> bool {
    true
}

/// Emits audit events according to its configuration
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    config: AuditConfig,
}

impl AuditLog {
    #[must_use]
    pub const fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Logged when a message is placed on the deferred queue
    ///
    /// # Fields
    /// - `idempotency_key`: Message identity
    /// - `reason`: Why it was deferred (`rate_limit`, `circuit_open`, `resubmission_failed`)
    /// - `retry_count`: Number of times the message has now been enqueued
    pub fn message_queued(&self, idempotency_key: &str, reason: &str, retry_count: u32) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::INFO,
            event = "MessageQueued",
            idempotency_key = %idempotency_key,
            reason = %reason,
            retry_count = retry_count,
            "Audit: Message deferred"
        );
    }

    /// Logged for each backend `send` invocation (1-based within the backend)
    pub fn dispatch_attempt(&self, idempotency_key: &str, backend: &str, attempt: u32) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::INFO,
            event = "DispatchAttempt",
            idempotency_key = %idempotency_key,
            backend = %backend,
            dispatch_attempt = attempt,
            "Audit: Dispatch attempt"
        );
    }

    /// Logged when a backend accepted the message
    ///
    /// # Fields
    /// - `attempts`: Total `send` invocations made during this dispatch
    /// - `duration_ms`: Wall time of the dispatch call
    pub fn dispatch_success(
        &self,
        idempotency_key: &str,
        backend: &str,
        attempts: u32,
        duration_ms: u128,
    ) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::INFO,
            event = "DispatchSuccess",
            idempotency_key = %idempotency_key,
            backend = %backend,
            attempts = attempts,
            duration_ms = duration_ms,
            "Audit: Dispatch successful"
        );
    }

    /// Logged when every backend has been exhausted for a message
    pub fn dispatch_failure(&self, idempotency_key: &str, error: &str, attempts: u32) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::WARN,
            event = "DispatchFailure",
            idempotency_key = %idempotency_key,
            error = %error,
            attempts = attempts,
            "Audit: Dispatch failed"
        );
    }

    pub fn duplicate_suppressed(&self, idempotency_key: &str, backend: Option<&str>) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::INFO,
            event = "DuplicateSuppressed",
            idempotency_key = %idempotency_key,
            backend = ?backend,
            "Audit: Duplicate suppressed, returning cached outcome"
        );
    }

    pub fn dead_lettered(&self, idempotency_key: &str, retry_count: u32) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::ERROR,
            event = "DeadLettered",
            idempotency_key = %idempotency_key,
            retry_count = retry_count,
            "Audit: Requeue limit reached, message dead-lettered"
        );
    }
}
