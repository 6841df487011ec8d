//! Backend capability consumed by the dispatcher
//!
//! A backend is anything that can take a [`Message`] and either accept it or
//! fail. The dispatcher knows nothing about the transport behind `send`;
//! latency and failure rate are the backend's own business.

mod simulated;

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use herald_common::Message;
use serde::{Deserialize, Serialize};

pub use simulated::{SimulatedBackend, SimulatedBackendConfig};

use crate::error::BackendError;

/// Acknowledgement returned by a backend that accepted a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub backend: Arc<str>,
    pub detail: String,
}

/// A fallible, latency-bearing delivery backend
///
/// Backends are tried in the order they are handed to the dispatcher; adding
/// a third backend requires no change to the dispatch logic.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Stable identity, used as the circuit breaker key and reported in outcomes
    fn name(&self) -> Arc<str>;

    /// Attempt to deliver the message once
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the backend did not accept the message.
    async fn send(&self, message: &Message) -> Result<Receipt, BackendError>;
}
