use async_trait::async_trait;
use event_schema::EventEnvelope;

#[derive(Debug, Clone)]
pub struct DlqMessage {
    pub receipt_handle: String,
    pub envelope: EventEnvelope,
}

/// Abstraction over the dead-letter queue this job drains. A concrete
/// SQS-backed implementation is out of scope (no credentials/endpoint
/// modeling here, matching the outbox publisher's bus abstraction) — this
/// system ships only the local stand-in below, which always reports an
/// empty queue.
#[async_trait]
pub trait DlqSource: Send + Sync {
    async fn receive(&self, max_batch: i64) -> anyhow::Result<Vec<DlqMessage>>;
    async fn delete(&self, receipt_handle: &str) -> anyhow::Result<()>;
}

pub struct LocalDlqSource;

#[async_trait]
impl DlqSource for LocalDlqSource {
    async fn receive(&self, _max_batch: i64) -> anyhow::Result<Vec<DlqMessage>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _receipt_handle: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
