use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::publisher::BusPublisher;
use crate::repository::OutboxRepository;

/// Default number of rows drained per poll, matching the original
/// `outbox_publisher.py`'s `BATCH_SIZE` exactly.
pub const DEFAULT_BATCH_SIZE: i64 = 10;
/// Default delay between polls when a cycle finds nothing to publish.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct OutboxProcessor<R: OutboxRepository> {
    repository: Arc<R>,
    publisher: Box<dyn BusPublisher>,
    batch_size: i64,
    poll_interval: Duration,
}

impl<R: OutboxRepository> OutboxProcessor<R> {
    pub fn new(repository: Arc<R>, publisher: Box<dyn BusPublisher>) -> Self {
        Self {
            repository,
            publisher,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs a single batch to completion. Returns the number of events
    /// published. An empty batch is not an error.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let result = self
            .repository
            .process_batch(self.batch_size, self.publisher.as_ref())
            .await?;

        if result.selected == 0 {
            return Ok(0);
        }

        info!(
            selected = result.selected,
            published = result.published,
            failed = result.failed,
            "OUTBOX_BATCH_PROCESSED"
        );

        Ok(result.published)
    }

    /// Polls forever at `poll_interval`. Intended to run as the entire body
    /// of the outbox-publisher binary's main loop.
    pub async fn start(&self) -> ! {
        loop {
            match self.run_once().await {
                Ok(_) => {}
                Err(e) => warn!(error = %e, "OUTBOX_BATCH_FAILED"),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutboxError;
    use crate::model::OutboxEvent;
    use crate::repository::BatchResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRepository {
        calls: AtomicUsize,
        events_per_call: Vec<usize>,
    }

    #[async_trait]
    impl OutboxRepository for CountingRepository {
        async fn process_batch(
            &self,
            _limit: i64,
            _publisher: &dyn BusPublisher,
        ) -> Result<BatchResult, OutboxError> {
            let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
            let selected = self.events_per_call.get(call_index).copied().unwrap_or(0);
            Ok(BatchResult {
                selected,
                published: selected,
                failed: 0,
            })
        }

        async fn pending_stats(&self) -> Result<(i64, i64), OutboxError> {
            Ok((0, 0))
        }
    }

    #[allow(dead_code)]
    fn sample_event() -> OutboxEvent {
        OutboxEvent::new(
            uuid::Uuid::new_v4(),
            "payment.created",
            1,
            serde_json::json!({"payment_id": "x"}),
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn run_once_reports_published_count() {
        let repo = Arc::new(CountingRepository {
            calls: AtomicUsize::new(0),
            events_per_call: vec![3],
        });
        let processor = OutboxProcessor::new(repo, Box::new(crate::publisher::LocalBusPublisher));

        let published = processor.run_once().await.unwrap();
        assert_eq!(published, 3);
    }

    #[tokio::test]
    async fn run_once_with_empty_batch_returns_zero() {
        let repo = Arc::new(CountingRepository {
            calls: AtomicUsize::new(0),
            events_per_call: vec![0],
        });
        let processor = OutboxProcessor::new(repo, Box::new(crate::publisher::LocalBusPublisher));

        let published = processor.run_once().await.unwrap();
        assert_eq!(published, 0);
    }
}
