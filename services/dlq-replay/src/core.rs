use outbox::BusPublisher;
use tracing::{info, warn};

use crate::source::DlqSource;

/// Event types eligible for replay. Anything else is poison and is deleted
/// without replay rather than retried forever.
const ALLOWED_EVENT_TYPES: [&str; 2] = ["payment.success", "payment.failed"];

/// Messages read and processed per cycle, matching the original
/// `dlq_replay_worker.py`'s `MAX_BATCH` exactly.
pub const MAX_BATCH: i64 = 10;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayResult {
    pub received: usize,
    pub replayed: usize,
    pub skipped_poison: usize,
    pub failed: usize,
}

impl ReplayResult {
    pub fn is_empty(&self) -> bool {
        self.received == 0
    }
}

pub async fn run_once(source: &dyn DlqSource, publisher: &dyn BusPublisher) -> anyhow::Result<ReplayResult> {
    let messages = source.receive(MAX_BATCH).await?;

    if messages.is_empty() {
        return Ok(ReplayResult::default());
    }

    let mut result = ReplayResult {
        received: messages.len(),
        ..Default::default()
    };

    for message in messages {
        if !ALLOWED_EVENT_TYPES.contains(&message.envelope.event_type.as_str()) {
            warn!(
                event_type = %message.envelope.event_type,
                event_id = %message.envelope.event_id,
                "DLQ_SKIP_NON_TERMINAL_EVENT"
            );
            if let Err(e) = source.delete(&message.receipt_handle).await {
                warn!(error = %e, "DLQ_DELETE_FAILED");
            }
            result.skipped_poison += 1;
            continue;
        }

        match publisher.publish(&message.envelope).await {
            Ok(()) => match source.delete(&message.receipt_handle).await {
                Ok(()) => {
                    info!(event_id = %message.envelope.event_id, "DLQ_REPLAYED");
                    result.replayed += 1;
                }
                Err(e) => {
                    warn!(event_id = %message.envelope.event_id, error = %e, "DLQ_DELETE_FAILED");
                    result.failed += 1;
                }
            },
            Err(e) => {
                warn!(event_id = %message.envelope.event_id, error = %e, "DLQ_REPLAY_FAILED");
                result.failed += 1;
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use event_schema::EventEnvelope;
    use outbox::LocalBusPublisher;
    use serde_json::json;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct FixedSource {
        messages: Mutex<Vec<crate::source::DlqMessage>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DlqSource for FixedSource {
        async fn receive(&self, _max_batch: i64) -> anyhow::Result<Vec<crate::source::DlqMessage>> {
            Ok(std::mem::take(&mut self.messages.lock().unwrap()))
        }

        async fn delete(&self, receipt_handle: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(receipt_handle.to_string());
            Ok(())
        }
    }

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            aggregate_id: Uuid::new_v4(),
            version: 1,
            occurred_at: Utc::now(),
            payload: json!({"payment_id": "abc"}),
        }
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let source = FixedSource { messages: Mutex::new(vec![]), deleted: Mutex::new(vec![]) };
        let result = run_once(&source, &LocalBusPublisher).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn poison_messages_are_deleted_without_replay() {
        let source = FixedSource {
            messages: Mutex::new(vec![crate::source::DlqMessage {
                receipt_handle: "r1".to_string(),
                envelope: envelope("payment.created"),
            }]),
            deleted: Mutex::new(vec![]),
        };

        let result = run_once(&source, &LocalBusPublisher).await.unwrap();
        assert_eq!(result.skipped_poison, 1);
        assert_eq!(result.replayed, 0);
        assert_eq!(source.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn eligible_messages_are_replayed_and_deleted() {
        let source = FixedSource {
            messages: Mutex::new(vec![crate::source::DlqMessage {
                receipt_handle: "r2".to_string(),
                envelope: envelope("payment.failed"),
            }]),
            deleted: Mutex::new(vec![]),
        };

        let result = run_once(&source, &LocalBusPublisher).await.unwrap();
        assert_eq!(result.replayed, 1);
        assert_eq!(source.deleted.lock().unwrap(), vec!["r2".to_string()]);
    }
}
