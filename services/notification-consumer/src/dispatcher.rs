use event_schema::{is_compatible, EventEnvelope};
use idempotent_consumer::{IdempotencyGuard, ProcessingResult};
use outbox::PaymentRepository;
use payment_worker::WorkerOutcome;
use resilience::CircuitBreaker;
use tracing::{info, warn};

/// Schema version this consumer expects for every known event type. A
/// single constant today since every event this system emits is version 1;
/// kept separate from `event_schema::SCHEMA_VERSION` because a consumer may
/// lag a publisher during a rollout.
const EXPECTED_VERSION: i32 = 1;

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Duplicate,
    /// Unknown event_type or version mismatch — dropped, not an error.
    Dropped,
}

/// Routes a single envelope to its handler. Returns `Err` only when the
/// handler itself failed — that's the one case this system lets surface,
/// since redelivery is the desired recovery.
///
/// `payment.created` is routed straight to the worker core: the worker's
/// own distributed lock and PENDING-status guard are its idempotency
/// mechanism, so this path deliberately bypasses the `ProcessedEvent`
/// dedup used for `payment.success`/`payment.failed` below.
pub async fn dispatch(
    envelope: &EventEnvelope,
    guard: &IdempotencyGuard,
    payment_repo: &dyn PaymentRepository,
    gateway_breaker: &CircuitBreaker,
) -> Result<DispatchOutcome, String> {
    if !is_known_event_type(&envelope.event_type) {
        warn!(event_type = %envelope.event_type, "UNHANDLED_EVENT_VERSION");
        return Ok(DispatchOutcome::Dropped);
    }

    if !is_compatible(EXPECTED_VERSION, envelope.version) {
        warn!(
            event_type = %envelope.event_type,
            version = envelope.version,
            expected = EXPECTED_VERSION,
            "UNSUPPORTED_EVENT_VERSION"
        );
        return Ok(DispatchOutcome::Dropped);
    }

    if envelope.event_type == "payment.created" {
        return dispatch_to_worker(envelope, payment_repo, gateway_breaker).await;
    }

    let event_type = envelope.event_type.clone();
    let payload = envelope.payload.clone();

    let result = guard
        .process_if_new(envelope.event_id, || async move {
            notify(&event_type, &payload).await
        })
        .await
        .map_err(|e| e.to_string())?;

    match result {
        ProcessingResult::Success => Ok(DispatchOutcome::Handled),
        ProcessingResult::AlreadyProcessed => {
            info!(event_id = %envelope.event_id, "duplicate notification event");
            Ok(DispatchOutcome::Duplicate)
        }
        ProcessingResult::Failed(reason) => Err(reason),
    }
}

async fn dispatch_to_worker(
    envelope: &EventEnvelope,
    payment_repo: &dyn PaymentRepository,
    gateway_breaker: &CircuitBreaker,
) -> Result<DispatchOutcome, String> {
    let outcome = payment_worker::process_payment(envelope.aggregate_id, payment_repo, gateway_breaker)
        .await
        .map_err(|e| e.to_string())?;

    match outcome {
        WorkerOutcome::Success | WorkerOutcome::Failed => Ok(DispatchOutcome::Handled),
        // Another worker holds the lock, or the payment is absent/already
        // terminal: a legitimate no-op, not a duplicate in the
        // ProcessedEvent sense.
        WorkerOutcome::LockNotAcquired | WorkerOutcome::NotActionable => {
            Ok(DispatchOutcome::Duplicate)
        }
    }
}

fn is_known_event_type(event_type: &str) -> bool {
    matches!(event_type, "payment.created" | "payment.success" | "payment.failed")
}

async fn notify(event_type: &str, payload: &serde_json::Value) -> Result<(), String> {
    let payment_id = payload.get("payment_id").and_then(|v| v.as_str()).unwrap_or("unknown");

    let message = match event_type {
        "payment.success" => format!("Payment {payment_id} completed successfully"),
        "payment.failed" => format!("Payment {payment_id} failed"),
        other => return Err(format!("notify called for unsupported event_type: {other}")),
    };

    let (email, sms) = tokio::join!(send_email(&message), send_sms(&message));
    email?;
    sms?;
    Ok(())
}

async fn send_email(message: &str) -> Result<(), String> {
    tracing::info!(message, "NOTIFICATION_EMAIL_SENT");
    Ok(())
}

async fn send_sms(message: &str) -> Result<(), String> {
    tracing::info!(message, "NOTIFICATION_SMS_SENT");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_event_types_are_recognized() {
        assert!(is_known_event_type("payment.created"));
        assert!(is_known_event_type("payment.success"));
        assert!(is_known_event_type("payment.failed"));
        assert!(!is_known_event_type("payment.refunded"));
    }

    #[tokio::test]
    async fn success_event_triggers_notification() {
        let result = notify("payment.success", &serde_json::json!({"payment_id": "abc"})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failed_event_triggers_notification() {
        let result = notify("payment.failed", &serde_json::json!({"payment_id": "abc"})).await;
        assert!(result.is_ok());
    }
}
