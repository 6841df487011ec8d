//! The unit of work handed to a dispatcher

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::IdempotencyKey;

/// A logical message awaiting delivery by one of the backends
///
/// The payload is opaque to the dispatch engine; only backends interpret it.
/// `retry_count` is owned by the deferred queue and counts how many times the
/// message has been (re-)enqueued, not how many send attempts were made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub idempotency_key: Option<IdempotencyKey>,
    pub payload: Arc<[u8]>,
    #[serde(default)]
    pub retry_count: u32,
}

impl Message {
    #[must_use]
    pub fn new(idempotency_key: impl Into<IdempotencyKey>, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            idempotency_key: Some(idempotency_key.into()),
            payload: payload.into(),
            retry_count: 0,
        }
    }

    /// A message with no idempotency key; dispatching it is a client error
    #[must_use]
    pub fn without_key(payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            idempotency_key: None,
            payload: payload.into(),
            retry_count: 0,
        }
    }

    /// The key, if present and non-empty
    #[must_use]
    pub fn key(&self) -> Option<&IdempotencyKey> {
        self.idempotency_key.as_ref().filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_key() {
        let message = Message::new("email-1", b"hello".as_slice());
        assert_eq!(message.key().map(IdempotencyKey::as_str), Some("email-1"));
        assert_eq!(message.retry_count, 0);
    }

    #[test]
    fn test_empty_key_is_absent() {
        let message = Message::new("", b"hello".as_slice());
        assert!(message.key().is_none());
        assert!(Message::without_key(b"x".as_slice()).key().is_none());
    }
}
