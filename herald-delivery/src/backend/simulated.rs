//! A stand-in backend with a configurable success rate and latency

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use herald_common::{Message, outgoing};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Backend, Receipt};
use crate::error::BackendError;

/// Configuration for a [`SimulatedBackend`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedBackendConfig {
    pub name: String,

    /// Probability (0.0 to 1.0) that a send succeeds
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    /// Fixed latency of every send (milliseconds)
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

const fn default_success_rate() -> f64 {
    0.7
}

const fn default_latency_ms() -> u64 {
    100
}

/// Backend that sleeps for its latency, then succeeds with `success_rate` probability
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    name: Arc<str>,
    success_rate: f64,
    latency: Duration,
}

impl SimulatedBackend {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, success_rate: f64, latency: Duration) -> Self {
        Self {
            name: name.into(),
            success_rate: success_rate.clamp(0.0, 1.0),
            latency,
        }
    }
}

impl From<&SimulatedBackendConfig> for SimulatedBackend {
    fn from(config: &SimulatedBackendConfig) -> Self {
        Self::new(
            config.name.as_str(),
            config.success_rate,
            Duration::from_millis(config.latency_ms),
        )
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    fn name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    async fn send(&self, message: &Message) -> Result<Receipt, BackendError> {
        tokio::time::sleep(self.latency).await;

        let roll: f64 = rand::rng().random();
        let key = message.key().map_or("<none>", |key| key.as_str());

        if roll < self.success_rate {
            outgoing!(backend = %self.name, idempotency_key = %key, "Simulated send accepted");
            Ok(Receipt {
                backend: Arc::clone(&self.name),
                detail: format!("Message sent successfully by {}", self.name),
            })
        } else {
            outgoing!(backend = %self.name, idempotency_key = %key, "Simulated send failed");
            Err(BackendError::Unavailable {
                backend: Arc::clone(&self.name),
                reason: format!("Failed to send message by {}", self.name),
            })
        }
    }
}
