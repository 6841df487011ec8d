use std::sync::{Arc, LazyLock};

use herald_common::{Signal, internal, logging};
use herald_delivery::{
    Backend, DispatchQueryService, Dispatcher, DispatcherConfig, SimulatedBackend,
    SimulatedBackendConfig,
};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::demo;

fn default_backends() -> Vec<SimulatedBackendConfig> {
    vec![
        SimulatedBackendConfig {
            name: "ProviderA".to_string(),
            success_rate: 0.7,
            latency_ms: 100,
        },
        SimulatedBackendConfig {
            name: "ProviderB".to_string(),
            success_rate: 0.8,
            latency_ms: 100,
        },
    ]
}

/// Top-level process configuration
#[derive(Debug, Deserialize)]
pub struct Herald {
    #[serde(alias = "dispatcher", default)]
    dispatch: DispatcherConfig,
    /// Backends in the order they are tried
    #[serde(alias = "backend", default = "default_backends")]
    backends: Vec<SimulatedBackendConfig>,
}

impl Default for Herald {
    fn default() -> Self {
        Self {
            dispatch: DispatcherConfig::default(),
            backends: default_backends(),
        }
    }
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    Ok(())
}

impl Herald {
    pub const fn dispatch_config(&self) -> &DispatcherConfig {
        &self.dispatch
    }

    pub fn backend_configs(&self) -> &[SimulatedBackendConfig] {
        &self.backends
    }

    /// Build the dispatcher described by this configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no backends are configured.
    pub fn dispatcher(&self) -> anyhow::Result<Arc<Dispatcher>> {
        let backends = self
            .backends
            .iter()
            .map(|config| Arc::new(SimulatedBackend::from(config)) as Arc<dyn Backend>)
            .collect();

        Ok(Arc::new(Dispatcher::new(self.dispatch.clone(), backends)?))
    }

    /// Run the dispatcher until a shutdown signal, or until the demo burst
    /// has been fully delivered when `demo` is set
    ///
    /// # Errors
    ///
    /// This function will return an error if the dispatcher cannot be built,
    /// or the drain loop cannot be started.
    pub async fn run(self, demo: Option<usize>) -> anyhow::Result<()> {
        logging::init();

        let dispatcher = self.dispatcher()?;

        internal!(
            level = INFO,
            backends = self.backends.len(),
            queue = self.dispatch.enable_queue,
            "Controller running"
        );

        let ret = if let Some(count) = demo {
            tokio::select! {
                r = demo::burst(&dispatcher, count) => {
                    let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);
                    r.map(|_| ())
                }
                r = shutdown() => {
                    r
                }
            }
        } else {
            tokio::select! {
                r = dispatcher.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                    r.map_err(anyhow::Error::from)
                }
                r = shutdown() => {
                    r
                }
            }
        };

        tracing::debug!(depth = dispatcher.queue_len(), "Final deferred queue depth");
        internal!(level = INFO, "Shutting down...");

        ret
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_backends() {
        let herald = Herald::default();
        let backends = herald.backend_configs();

        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].name, "ProviderA");
        assert!((backends[0].success_rate - 0.7).abs() < f64::EPSILON);
        assert_eq!(backends[1].name, "ProviderB");
        assert!((backends[1].success_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_empty_config() {
        let herald: Herald = ron::from_str("()").unwrap();

        assert!(herald.dispatch_config().enable_queue);
        assert_eq!(herald.dispatch_config().rate_limit.max_requests, 5);
        assert_eq!(herald.dispatch_config().retry.max_attempts, 3);
        assert_eq!(herald.backend_configs().len(), 2);
    }

    #[test]
    fn test_parse_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"(
                dispatch: (
                    enable_queue: false,
                    rate_limit: (max_requests: 10, window_ms: 2000),
                    circuit_breaker: (
                        failure_threshold: 2,
                        backend_overrides: {{
                            "Flaky": (failure_threshold: 1, cooldown_ms: 10000),
                        }},
                    ),
                    queue: (max_requeues: Some(4)),
                ),
                backends: [
                    (name: "Flaky", success_rate: 0.5, latency_ms: 10),
                    (name: "Steady"),
                ],
            )"#
        )
        .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let herald: Herald = ron::from_str(&content).unwrap();
        let config = herald.dispatch_config();

        assert!(!config.enable_queue);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_ms, 2000);
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.cooldown_ms, 5000);
        assert_eq!(
            config.circuit_breaker.backend_overrides["Flaky"].failure_threshold,
            1
        );
        assert_eq!(config.queue.max_requeues, Some(4));
        assert_eq!(config.queue.drain_interval_ms, 500);

        let backends = herald.backend_configs();
        assert_eq!(backends[0].name, "Flaky");
        assert_eq!(backends[0].latency_ms, 10);
        assert_eq!(backends[1].name, "Steady");
        assert_eq!(backends[1].latency_ms, 100);
    }

    #[test]
    fn test_dispatcher_follows_backend_order() {
        let herald: Herald = ron::from_str(
            r#"(backends: [(name: "Second"), (name: "First")], dispatch: (enable_queue: false))"#,
        )
        .unwrap();

        let dispatcher = herald.dispatcher().unwrap();
        let names: Vec<_> = dispatcher
            .backends()
            .iter()
            .map(|backend| backend.name().to_string())
            .collect();

        assert_eq!(names, vec!["Second", "First"]);
        assert!(!dispatcher.queue_enabled());
    }

    #[test]
    fn test_dispatcher_rejects_empty_backends() {
        let herald: Herald = ron::from_str("(backends: [])").unwrap();

        assert!(herald.dispatcher().is_err());
    }
}
