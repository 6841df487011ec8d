//! Deferred redelivery queue
//!
//! Holds messages that could not be admitted or dispatched immediately. The
//! dispatcher's drain loop pops the oldest message once per interval and
//! resubmits it through the normal dispatch path.
//!
//! Requeueing is unbounded by default: a message that keeps failing cycles
//! through the queue at the drain cadence forever. Set
//! [`QueueConfig::max_requeues`] to move such messages to the dead-letter list.

use std::{collections::VecDeque, time::Duration};

use herald_common::{IdempotencyKey, Message, internal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Configuration for the deferred queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How often the drain loop resubmits one message (milliseconds)
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// Maximum number of times a message may be enqueued before it is
    /// dead-lettered instead
    ///
    /// Copies parked behind an open circuit are not capped.
    ///
    /// Default: `None` (requeue forever)
    #[serde(default)]
    pub max_requeues: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: default_drain_interval_ms(),
            max_requeues: None,
        }
    }
}

const fn default_drain_interval_ms() -> u64 {
    500
}

impl QueueConfig {
    #[must_use]
    pub const fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// What happened to a message handed to [`DeferredQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended at the tail; carries the message's new `retry_count`
    Queued(u32),
    /// A message with the same key is already waiting
    AlreadyQueued,
    /// The requeue limit was reached; carries the final `retry_count`
    DeadLettered(u32),
    /// The queue was disabled at construction
    Disabled,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Message>,
    dead_letters: Vec<Message>,
}

/// FIFO of deferred messages
#[derive(Debug)]
pub struct DeferredQueue {
    enabled: bool,
    config: QueueConfig,
    state: Mutex<QueueState>,
}

impl DeferredQueue {
    #[must_use]
    pub fn new(enabled: bool, config: QueueConfig) -> Self {
        Self {
            enabled,
            config,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add a message at the tail, incrementing its `retry_count`
    ///
    /// A message that has reached the requeue limit is dead-lettered instead,
    /// together with any copy of it still waiting in the queue.
    pub fn enqueue(&self, message: Message) -> Enqueued {
        self.push(message, true)
    }

    /// Add a message at the tail without applying the requeue limit
    ///
    /// Used for copies parked behind an open circuit while the same dispatch
    /// carries on with the next backend; the limit is applied when a
    /// resubmission actually fails.
    pub fn enqueue_uncapped(&self, message: Message) -> Enqueued {
        self.push(message, false)
    }

    fn push(&self, mut message: Message, capped: bool) -> Enqueued {
        if !self.enabled {
            return Enqueued::Disabled;
        }

        let mut state = self.state.lock();

        if capped
            && let Some(limit) = self.config.max_requeues
            && message.retry_count >= limit
        {
            if let Some(key) = message.key() {
                state.pending.retain(|queued| queued.key() != Some(key));
            }

            let retry_count = message.retry_count;
            state.dead_letters.push(message);
            return Enqueued::DeadLettered(retry_count);
        }

        if let Some(key) = message.key()
            && state.pending.iter().any(|queued| queued.key() == Some(key))
        {
            return Enqueued::AlreadyQueued;
        }

        message.retry_count = message.retry_count.saturating_add(1);
        let retry_count = message.retry_count;
        internal!(
            level = DEBUG,
            idempotency_key = ?message.key().map(IdempotencyKey::as_str),
            retry_count,
            depth = state.pending.len() + 1,
            "Queued message for redelivery"
        );
        state.pending.push_back(message);

        Enqueued::Queued(retry_count)
    }

    /// Remove and return the oldest message
    pub fn pop(&self) -> Option<Message> {
        self.state.lock().pending.pop_front()
    }

    /// Whether a message with this key is waiting
    pub fn contains(&self, key: &IdempotencyKey) -> bool {
        self.state
            .lock()
            .pending
            .iter()
            .any(|queued| queued.key() == Some(key))
    }

    /// Current depth (for monitoring)
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Messages that exceeded the requeue limit
    pub fn dead_letters(&self) -> Vec<Message> {
        self.state.lock().dead_letters.clone()
    }
}
