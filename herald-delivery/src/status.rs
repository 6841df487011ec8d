//! Latest-known-state log, one record per idempotency key

use std::sync::Arc;

use dashmap::DashMap;
use herald_common::IdempotencyKey;

use crate::types::{RecordStatus, StatusRecord};

/// Status records, overwritten on every state transition
///
/// This is not a history: a query returns only the most recent record.
#[derive(Debug, Default)]
pub struct StatusLog {
    records: DashMap<IdempotencyKey, StatusRecord>,
}

impl StatusLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest state of a message, replacing any previous record
    pub fn record(
        &self,
        key: &IdempotencyKey,
        backend: Option<Arc<str>>,
        status: RecordStatus,
        attempts: u32,
    ) {
        self.records.insert(
            key.clone(),
            StatusRecord::new(key.clone(), backend, status, attempts),
        );
    }

    /// Latest record for a key, or `None` if the key was never seen
    pub fn get(&self, key: &IdempotencyKey) -> Option<StatusRecord> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
