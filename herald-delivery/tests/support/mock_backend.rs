//! Scripted mock backend for testing dispatch scenarios
//!
//! Each call to `send` consumes the next scripted result; once the script is
//! exhausted the backend falls back to its default behaviour.
#![allow(dead_code)] // Test utility module - not all methods used in every test
//!
//! # Example
//!
//! ```rust,ignore
//! let backend = MockBackend::builder("Primary")
//!     .with_script([false, false, true])
//!     .build();
//!
//! // First two sends fail, the third succeeds, later sends succeed
//! ```

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_common::Message;
use herald_delivery::{Backend, BackendError, Receipt};
use parking_lot::Mutex;

/// Mock backend with a per-call success/failure script
#[derive(Debug)]
pub struct MockBackend {
    name: Arc<str>,
    script: Mutex<VecDeque<bool>>,
    fallback: bool,
    latency: Option<Duration>,
    calls: AtomicUsize,
    sent: Mutex<Vec<Message>>,
}

impl MockBackend {
    /// Create a new builder for configuring the mock backend
    #[must_use]
    pub fn builder(name: &str) -> MockBackendBuilder {
        MockBackendBuilder::new(name)
    }

    /// A backend whose every send succeeds
    #[must_use]
    pub fn healthy(name: &str) -> Arc<Self> {
        Arc::new(Self::builder(name).build())
    }

    /// A backend whose every send fails
    #[must_use]
    pub fn broken(name: &str) -> Arc<Self> {
        Arc::new(Self::builder(name).failing().build())
    }

    /// Number of `send` invocations so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages this backend accepted
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Replace the remaining script
    pub fn set_script(&self, script: impl IntoIterator<Item = bool>) {
        *self.script.lock() = script.into_iter().collect();
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    async fn send(&self, message: &Message) -> Result<Receipt, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let succeed = self.script.lock().pop_front().unwrap_or(self.fallback);

        if succeed {
            self.sent.lock().push(message.clone());
            Ok(Receipt {
                backend: Arc::clone(&self.name),
                detail: format!("Message sent successfully by {}", self.name),
            })
        } else {
            Err(BackendError::Unavailable {
                backend: Arc::clone(&self.name),
                reason: "scripted failure".to_string(),
            })
        }
    }
}

/// Builder for configuring a `MockBackend`
pub struct MockBackendBuilder {
    name: Arc<str>,
    script: VecDeque<bool>,
    fallback: bool,
    latency: Option<Duration>,
}

impl MockBackendBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            script: VecDeque::new(),
            fallback: true,
            latency: None,
        }
    }

    /// Results for the first sends, in order (`true` = success)
    #[must_use]
    pub fn with_script(mut self, script: impl IntoIterator<Item = bool>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    /// Fail every send once the script is exhausted
    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fallback = false;
        self
    }

    /// Sleep before answering each send
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn build(self) -> MockBackend {
        MockBackend {
            name: self.name,
            script: Mutex::new(self.script),
            fallback: self.fallback,
            latency: self.latency,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }
}
