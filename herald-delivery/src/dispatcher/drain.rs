//! Deferred queue drain loop

use std::sync::{Arc, atomic::Ordering};

use herald_common::{Signal, internal};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error};

use super::{Dispatcher, dispatch::DeferReason};
use crate::{
    error::{DispatchError, SystemError},
    types::DispatchOutcome,
};

/// Handle to a drain loop started with [`Dispatcher::start_queue`]
#[derive(Debug)]
pub struct DrainHandle {
    shutdown: broadcast::Sender<Signal>,
    task: JoinHandle<()>,
}

impl DrainHandle {
    /// Stop the drain loop, waiting for an in-flight resubmission to finish
    pub async fn stop(self) {
        // A send error means the loop has already exited
        let _ = self.shutdown.send(Signal::Shutdown);

        if let Err(e) = self.task.await {
            error!("Deferred queue drain task failed: {e}");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Dispatcher {
    /// Resubmit the oldest deferred message, if any
    ///
    /// A resubmission that exhausts every backend is put back at the tail of
    /// the queue. Returns the outcome of the resubmission, or `None` if the
    /// queue was empty.
    pub async fn drain_once(&self) -> Option<DispatchOutcome> {
        let message = self.queue.pop()?;
        let key = message.key().cloned()?;

        debug!(
            idempotency_key = %key,
            retry_count = message.retry_count,
            remaining = self.queue.len(),
            "Resubmitting deferred message"
        );

        match self.dispatch_inner(message.clone()).await {
            Ok(outcome) => Some(outcome),
            Err(error @ DispatchError::AllBackendsExhausted { attempts }) => {
                if let Err(e) = self.defer(&key, message, DeferReason::ResubmissionFailed, None) {
                    return Some(e.to_outcome(attempts));
                }
                Some(error.to_outcome(attempts))
            }
            Err(e) => Some(e.to_outcome(0)),
        }
    }

    fn acquire_drain(&self) -> Result<(), DispatchError> {
        if !self.queue.is_enabled() {
            return Err(SystemError::QueueDisabled.into());
        }

        if self.draining.swap(true, Ordering::SeqCst) {
            return Err(SystemError::AlreadyRunning.into());
        }

        Ok(())
    }

    /// One resubmission per tick; a tick that fires while the previous
    /// resubmission is still running is skipped.
    async fn drain_loop(&self, mut shutdown: broadcast::Receiver<Signal>) {
        let drain_interval = self.queue.config().drain_interval();
        internal!(
            level = INFO,
            drain_interval_ms = self.queue.config().drain_interval_ms,
            "Deferred queue drain starting"
        );

        let mut timer = tokio::time::interval(drain_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Some(outcome) = self.drain_once().await {
                        debug!(
                            status = %outcome.status,
                            attempts = outcome.attempts,
                            depth = self.queue.len(),
                            "Deferred message resubmitted"
                        );
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(
                                level = INFO,
                                depth = self.queue.len(),
                                "Deferred queue drain received shutdown signal"
                            );
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("Drain shutdown channel lagged by {skipped} signal(s)");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            error!("Deferred queue drain shutdown channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.draining.store(false, Ordering::SeqCst);
        internal!("Deferred queue drain shutdown complete");
    }

    /// Run the drain loop until a shutdown signal is received
    ///
    /// # Errors
    ///
    /// Returns a system error if the queue is disabled or a drain loop is
    /// already running for this dispatcher.
    pub async fn serve(&self, shutdown: broadcast::Receiver<Signal>) -> Result<(), DispatchError> {
        self.acquire_drain()?;
        self.drain_loop(shutdown).await;

        Ok(())
    }

    /// Spawn the drain loop on the current runtime
    ///
    /// # Errors
    ///
    /// Returns a system error if the queue is disabled or a drain loop is
    /// already running for this dispatcher.
    pub fn start_queue(self: &Arc<Self>) -> Result<DrainHandle, DispatchError> {
        self.acquire_drain()?;

        let (shutdown, receiver) = broadcast::channel(1);
        let dispatcher = Arc::clone(self);
        let task = tokio::spawn(async move { dispatcher.drain_loop(receiver).await });

        Ok(DrainHandle { shutdown, task })
    }
}
