use async_trait::async_trait;
use event_schema::EventEnvelope;
use tracing::{info, warn};

/// Abstraction over the event bus the outbox publisher drains into,
/// matching the corpus's `OutboxPublisher` trait shape so the concrete bus
/// is swappable. A concrete AWS EventBridge integration is out of scope for
/// this system (no credentials/endpoint modeling) — both implementations
/// here only ever log.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

/// Default bus: logs the envelope and returns success. Used whenever
/// `USE_AWS_EVENTS` is unset or false.
pub struct LocalBusPublisher;

#[async_trait]
impl BusPublisher for LocalBusPublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        info!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            aggregate_id = %envelope.aggregate_id,
            "EVENT_PUBLISH_SKIPPED_LOCAL"
        );
        Ok(())
    }
}

/// Best-effort stand-in for an EventBridge `put_events` call. Never raises
/// past the trait boundary: the concrete SDK integration is out of scope,
/// matching the original's "log and continue" semantics for event
/// publication.
pub struct AwsEventsPublisher {
    pub event_bus_name: String,
}

#[async_trait]
impl BusPublisher for AwsEventsPublisher {
    async fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        info!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            event_bus_name = %self.event_bus_name,
            "EVENT_PUBLISH_ATTEMPTED_AWS"
        );
        // No AWS SDK client is wired here; this system only needs the
        // publish-path shape, not a working EventBridge integration.
        Ok(())
    }
}

/// Builds the configured publisher. `USE_AWS_EVENTS` defaults to false,
/// matching the original `event_publisher.py` exactly.
pub fn build_publisher() -> Box<dyn BusPublisher> {
    let use_aws_events = std::env::var("USE_AWS_EVENTS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    if use_aws_events {
        let event_bus_name =
            std::env::var("EVENT_BUS_NAME").unwrap_or_else(|_| "default".to_string());
        Box::new(AwsEventsPublisher { event_bus_name })
    } else {
        Box::new(LocalBusPublisher)
    }
}

/// Checks the payload contract before an event is handed to a publisher.
/// A payload missing `payment_id` is dropped rather than published.
pub fn validate_payload(envelope: &EventEnvelope) -> bool {
    if !event_schema::has_payment_id(&envelope.payload) {
        warn!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            "EVENT_PUBLISH_DROPPED_MISSING_PAYMENT_ID"
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn sample_envelope(payload: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: "payment.created".to_string(),
            aggregate_id: Uuid::new_v4(),
            version: 1,
            occurred_at: Utc::now(),
            payload,
        }
    }

    #[tokio::test]
    async fn local_publisher_always_succeeds() {
        let publisher = LocalBusPublisher;
        let envelope = sample_envelope(json!({"payment_id": "abc"}));
        assert!(publisher.publish(&envelope).await.is_ok());
    }

    #[test]
    fn validate_payload_rejects_missing_payment_id() {
        let envelope = sample_envelope(json!({"amount": 100}));
        assert!(!validate_payload(&envelope));
    }

    #[test]
    fn validate_payload_accepts_payment_id() {
        let envelope = sample_envelope(json!({"payment_id": "abc"}));
        assert!(validate_payload(&envelope));
    }
}
