//! Demo burst: submit a run of messages and watch the deferred queue drain

use std::{sync::Arc, time::Duration};

use herald_common::{IdempotencyKey, Message, internal};
use herald_delivery::{DispatchQueryService, Dispatcher, DispatchStatus};

/// Key of the `index`-th demo message
#[must_use]
pub fn demo_key(index: usize) -> String {
    format!("queue{index}")
}

/// Submit `count` messages one after another, then wait until the deferred
/// queue is empty
///
/// Returns the status of each initial submission, in order.
///
/// # Errors
///
/// Returns an error if the drain loop cannot be started.
pub async fn burst(
    dispatcher: &Arc<Dispatcher>,
    count: usize,
) -> anyhow::Result<Vec<DispatchStatus>> {
    let drain = if dispatcher.queue_enabled() {
        Some(dispatcher.start_queue()?)
    } else {
        None
    };

    let mut statuses = Vec::with_capacity(count);

    for index in 0..count {
        let message = Message::new(demo_key(index), b"Testing queue system".as_slice());
        let outcome = dispatcher.dispatch(message).await;

        println!("Initial send {}: {}", index + 1, outcome.status);
        statuses.push(outcome.status);
    }

    if let Some(drain) = drain {
        let poll = Duration::from_millis(100);
        while dispatcher.queue_len() > 0 {
            tokio::time::sleep(poll).await;
        }

        drain.stop().await;
    }

    for index in 0..count {
        let key = IdempotencyKey::from(demo_key(index));
        match dispatcher.status(&key) {
            Some(record) => println!(
                "{key}: {} via {} after {} attempt(s)",
                record.status,
                record.backend.as_deref().unwrap_or("-"),
                record.attempts
            ),
            None => println!("{key}: unknown"),
        }
    }

    internal!(
        level = INFO,
        submitted = count,
        dead_letters = dispatcher.dead_letters().len(),
        "Demo burst complete"
    );

    Ok(statuses)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use herald_delivery::{Backend, DispatcherConfig, RateLimitConfig, RecordStatus, SimulatedBackend};

    use super::*;

    fn reliable_dispatcher(config: DispatcherConfig) -> Arc<Dispatcher> {
        let backend: Arc<dyn Backend> = Arc::new(SimulatedBackend::new(
            "Reliable",
            1.0,
            Duration::from_millis(100),
        ));

        Arc::new(Dispatcher::new(config, vec![backend]).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_drains_rate_limited_messages() {
        let dispatcher = reliable_dispatcher(DispatcherConfig {
            rate_limit: RateLimitConfig {
                max_requests: 1,
                window_ms: 1000,
            },
            ..Default::default()
        });

        let statuses = burst(&dispatcher, 3).await.unwrap();

        assert_eq!(
            statuses,
            vec![
                DispatchStatus::Success,
                DispatchStatus::Queued,
                DispatchStatus::Queued
            ]
        );
        assert_eq!(dispatcher.queue_len(), 0);
        assert!(!dispatcher.is_draining());

        for index in 0..3 {
            let record = dispatcher
                .status(&IdempotencyKey::from(demo_key(index)))
                .unwrap();
            assert_eq!(record.status, RecordStatus::Success);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_without_queue() {
        let dispatcher = reliable_dispatcher(DispatcherConfig {
            enable_queue: false,
            ..Default::default()
        });

        let statuses = burst(&dispatcher, 2).await.unwrap();

        assert_eq!(statuses, vec![DispatchStatus::Success; 2]);
        assert_eq!(demo_key(1), "queue1");
    }
}
