//! Type definitions for dispatch outcomes and status records

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use herald_common::IdempotencyKey;
use serde::{Deserialize, Serialize};

/// Result classification returned to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Success,
    Duplicate,
    Queued,
    Failure,
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Duplicate => "duplicate",
            Self::Queued => "queued",
            Self::Failure => "failure",
        })
    }
}

/// What a single `dispatch` call produced
///
/// Immutable once built. A successful outcome is cached verbatim in the dedup
/// cache and replayed, re-tagged as [`DispatchStatus::Duplicate`], for every
/// later call with the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub status: DispatchStatus,
    /// Backend that accepted the message (success and duplicate only)
    pub backend: Option<Arc<str>>,
    pub detail: String,
    /// Backend `send` invocations made during the dispatch, summed across backends
    pub attempts: u32,
}

impl DispatchOutcome {
    #[must_use]
    pub fn success(backend: Arc<str>, detail: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: DispatchStatus::Success,
            backend: Some(backend),
            detail: detail.into(),
            attempts,
        }
    }

    #[must_use]
    pub fn queued(detail: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Queued,
            backend: None,
            detail: detail.into(),
            attempts: 0,
        }
    }

    #[must_use]
    pub fn failure(detail: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: DispatchStatus::Failure,
            backend: None,
            detail: detail.into(),
            attempts,
        }
    }

    /// The cached outcome as returned to a repeated submission
    #[must_use]
    pub fn as_duplicate(&self) -> Self {
        Self {
            status: DispatchStatus::Duplicate,
            backend: self.backend.clone(),
            detail: self.detail.clone(),
            attempts: self.attempts,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, DispatchStatus::Success)
    }
}

/// Latest known state of a message, as recorded in the status log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    QueuedRateLimit,
    QueuedCircuitOpen,
    Success,
    Failure,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QueuedRateLimit => "queued_rate_limit",
            Self::QueuedCircuitOpen => "queued_circuit_open",
            Self::Success => "success",
            Self::Failure => "failure",
        })
    }
}

/// One record per idempotency key, overwritten on every state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub idempotency_key: IdempotencyKey,
    pub timestamp: DateTime<Utc>,
    pub backend: Option<Arc<str>>,
    pub status: RecordStatus,
    pub attempts: u32,
}

impl StatusRecord {
    #[must_use]
    pub fn new(
        idempotency_key: IdempotencyKey,
        backend: Option<Arc<str>>,
        status: RecordStatus,
        attempts: u32,
    ) -> Self {
        Self {
            idempotency_key,
            timestamp: Utc::now(),
            backend,
            status,
            attempts,
        }
    }
}
