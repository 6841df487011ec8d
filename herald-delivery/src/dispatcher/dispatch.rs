//! The per-message state machine
//!
//! 1. Reject a message without an idempotency key
//! 2. Admission check; on denial defer the message and report it queued
//! 3. Dedup check; a resolved key is answered from the cache
//! 4. Try each backend in order, gated by its circuit breaker, under the
//!    retry policy
//! 5. If every backend is exhausted, report failure without caching it

use std::sync::Arc;

use herald_common::{IdempotencyKey, Message, incoming, internal};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::Dispatcher;
use crate::{
    backend::{Backend, Receipt},
    error::{DispatchError, RetryError},
    queue::Enqueued,
    retry::Retried,
    types::{DispatchOutcome, RecordStatus},
};

/// Why a message is being handed to the deferred queue
#[derive(Debug, Clone, Copy)]
pub(super) enum DeferReason {
    RateLimit,
    CircuitOpen,
    ResubmissionFailed,
}

impl DeferReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::CircuitOpen => "circuit_open",
            Self::ResubmissionFailed => "resubmission_failed",
        }
    }
}

impl DispatchError {
    /// The outcome reported to the caller for a condition that ended a dispatch
    pub(super) fn to_outcome(&self, attempts: u32) -> DispatchOutcome {
        match self {
            Self::ClientError => DispatchOutcome::failure("Idempotency key is required.", 0),
            Self::AdmissionDenied => {
                DispatchOutcome::queued("Rate limit hit. Message has been queued for retry.")
            }
            Self::AllBackendsExhausted { .. } => DispatchOutcome::failure(
                "All backends failed to send the message after retries.",
                attempts,
            ),
            other => DispatchOutcome::failure(other.to_string(), attempts),
        }
    }
}

impl Dispatcher {
    /// Dispatch one message
    ///
    /// Never fails: every condition, recoverable or not, is reported as a
    /// [`DispatchOutcome`].
    pub async fn dispatch(&self, message: Message) -> DispatchOutcome {
        match self.dispatch_inner(message).await {
            Ok(outcome) => outcome,
            Err(error @ DispatchError::AllBackendsExhausted { attempts }) => {
                error.to_outcome(attempts)
            }
            Err(error) => error.to_outcome(0),
        }
    }

    /// Run the state machine, returning `Err` only for conditions that end
    /// the dispatch without a success, duplicate or queued outcome
    pub(super) async fn dispatch_inner(
        &self,
        message: Message,
    ) -> Result<DispatchOutcome, DispatchError> {
        let started = Instant::now();

        let Some(key) = message.key().cloned() else {
            incoming!(level = WARN, "Rejected message without idempotency key");
            return Err(DispatchError::ClientError);
        };

        incoming!(
            level = DEBUG,
            idempotency_key = %key,
            retry_count = message.retry_count,
            "Dispatch requested"
        );

        if !self.rate_limiter.admit() {
            self.defer(&key, message, DeferReason::RateLimit, None)?;
            return Ok(DispatchError::AdmissionDenied.to_outcome(0));
        }

        // Held until this dispatch resolves; concurrent dispatches of the
        // same key wait here
        let mut slot = self.dedup.claim(&key).await;

        if let Some(cached) = slot.cached() {
            self.audit
                .duplicate_suppressed(&key, cached.backend.as_deref());
            return Ok(cached.as_duplicate());
        }

        let mut attempts = 0;

        for backend in &self.backends {
            let name = backend.name();

            if !self.circuit_breaker.can_request(&name) {
                warn!(
                    idempotency_key = %key,
                    backend = %name,
                    "{}, trying next backend",
                    DispatchError::CircuitOpen {
                        backend: Arc::clone(&name)
                    }
                );
                if let Err(e) = self.defer(
                    &key,
                    message.clone(),
                    DeferReason::CircuitOpen,
                    Some(Arc::clone(&name)),
                ) {
                    debug!(idempotency_key = %key, "{e}");
                }
                continue;
            }

            match self.send_with_retry(backend.as_ref(), &key, &message).await {
                Ok(Retried {
                    value: receipt,
                    attempts: used,
                }) => {
                    attempts += used;
                    self.circuit_breaker.on_success(&name);

                    let outcome = DispatchOutcome::success(
                        Arc::clone(&receipt.backend),
                        receipt.detail,
                        attempts,
                    );
                    slot.resolve(outcome.clone());
                    self.status
                        .record(&key, Some(receipt.backend), RecordStatus::Success, attempts);
                    self.audit
                        .dispatch_success(&key, &name, attempts, started.elapsed().as_millis());

                    return Ok(outcome);
                }
                Err(source) => {
                    attempts += source.attempts;
                    self.circuit_breaker.on_failure(&name);

                    warn!(
                        idempotency_key = %key,
                        "{}",
                        DispatchError::BackendFailure {
                            backend: name,
                            source,
                        }
                    );
                }
            }
        }

        let error = DispatchError::AllBackendsExhausted { attempts };
        self.status
            .record(&key, None, RecordStatus::Failure, attempts);
        self.audit.dispatch_failure(&key, &error.to_string(), attempts);

        Err(error)
    }

    async fn send_with_retry(
        &self,
        backend: &dyn Backend,
        key: &IdempotencyKey,
        message: &Message,
    ) -> Result<Retried<Receipt>, RetryError> {
        let name = backend.name();

        self.retry
            .execute(|attempt| {
                self.audit.dispatch_attempt(key, &name, attempt);
                backend.send(message)
            })
            .await
    }

    /// Hand a message to the deferred queue and record why
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RequeueLimitReached`] if the message was
    /// dead-lettered instead.
    pub(super) fn defer(
        &self,
        key: &IdempotencyKey,
        message: Message,
        reason: DeferReason,
        backend: Option<Arc<str>>,
    ) -> Result<(), DispatchError> {
        let enqueued = match reason {
            DeferReason::CircuitOpen => self.queue.enqueue_uncapped(message),
            DeferReason::RateLimit | DeferReason::ResubmissionFailed => self.queue.enqueue(message),
        };

        match enqueued {
            Enqueued::DeadLettered(retry_count) => {
                self.status.record(key, backend, RecordStatus::Failure, 0);
                self.audit.dead_lettered(key, retry_count);
                return Err(DispatchError::RequeueLimitReached { retry_count });
            }
            Enqueued::Queued(retry_count) => {
                self.audit.message_queued(key, reason.as_str(), retry_count);
            }
            Enqueued::AlreadyQueued => {
                internal!(
                    level = DEBUG,
                    idempotency_key = %key,
                    "Message already waiting in deferred queue"
                );
            }
            Enqueued::Disabled => {}
        }

        let status = match reason {
            DeferReason::RateLimit => Some(RecordStatus::QueuedRateLimit),
            DeferReason::CircuitOpen => Some(RecordStatus::QueuedCircuitOpen),
            // The dispatch that failed has already recorded its outcome
            DeferReason::ResubmissionFailed => None,
        };
        if let Some(status) = status {
            self.status.record(key, backend, status, 0);
        }

        Ok(())
    }
}
