//! Idempotency-keyed outcome cache
//!
//! Each key owns an async lock guarding its cached outcome. A dispatch holds
//! the key's [`DedupSlot`] from the dedup check until it resolves, so two
//! concurrent dispatches of the same key can never both treat it as a first
//! send: the second waits, then observes the first one's cached success.

use std::sync::Arc;

use dashmap::DashMap;
use herald_common::IdempotencyKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::DispatchOutcome;

type Entry = Arc<Mutex<Option<DispatchOutcome>>>;

/// Cache of first successful outcomes, keyed by idempotency key
#[derive(Debug, Default)]
pub struct DedupCache {
    entries: DashMap<IdempotencyKey, Entry>,
}

/// Exclusive access to one key's cache entry
#[derive(Debug)]
pub struct DedupSlot {
    guard: OwnedMutexGuard<Option<DispatchOutcome>>,
}

impl DedupSlot {
    /// The cached outcome, if the key has already been resolved
    #[must_use]
    pub fn cached(&self) -> Option<&DispatchOutcome> {
        self.guard.as_ref()
    }

    /// Cache `outcome` unless an outcome is already present
    pub fn resolve(&mut self, outcome: DispatchOutcome) {
        if self.guard.is_none() {
            *self.guard = Some(outcome);
        }
    }
}

impl DedupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &IdempotencyKey) -> Entry {
        if let Some(entry) = self.entries.get(key) {
            return Arc::clone(entry.value());
        }

        Arc::clone(
            self.entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value(),
        )
    }

    /// Acquire the key's slot, waiting for any in-flight dispatch of the same key
    pub async fn claim(&self, key: &IdempotencyKey) -> DedupSlot {
        DedupSlot {
            guard: self.entry(key).lock_owned().await,
        }
    }

    /// Look up the cached outcome for a key
    pub async fn get(&self, key: &IdempotencyKey) -> Option<DispatchOutcome> {
        let entry = self.entries.get(key).map(|entry| Arc::clone(entry.value()))?;
        let cached = entry.lock().await;
        cached.clone()
    }

    /// Cache an outcome for a key; the first cached outcome wins
    pub async fn put(&self, key: &IdempotencyKey, outcome: DispatchOutcome) {
        self.claim(key).await.resolve(outcome);
    }

    /// Number of keys that have been claimed, resolved or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn outcome(backend: &str) -> DispatchOutcome {
        DispatchOutcome::success(Arc::from(backend), "sent", 1)
    }

    #[tokio::test]
    async fn test_get_put() {
        let cache = DedupCache::new();
        let key = IdempotencyKey::new("email-1");

        assert_eq!(cache.get(&key).await, None);
        cache.put(&key, outcome("ProviderA")).await;
        assert_eq!(cache.get(&key).await, Some(outcome("ProviderA")));
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let cache = DedupCache::new();
        let key = IdempotencyKey::new("email-1");

        cache.put(&key, outcome("ProviderA")).await;
        cache.put(&key, outcome("ProviderB")).await;
        assert_eq!(cache.get(&key).await, Some(outcome("ProviderA")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_serializes_same_key() {
        let cache = Arc::new(DedupCache::new());
        let key = IdempotencyKey::new("email-1");

        let mut first = cache.claim(&key).await;
        assert!(first.cached().is_none());

        let waiter = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            tokio::spawn(async move {
                let slot = cache.claim(&key).await;
                slot.cached().cloned()
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        first.resolve(outcome("ProviderA"));
        drop(first);

        assert_eq!(waiter.await.ok().flatten(), Some(outcome("ProviderA")));
    }

    #[tokio::test]
    async fn test_unresolved_claim_caches_nothing() {
        let cache = DedupCache::new();
        let key = IdempotencyKey::new("email-1");

        drop(cache.claim(&key).await);
        assert_eq!(cache.get(&key).await, None);
        assert_eq!(cache.len(), 1);
    }
}
