use outbox::{OutboxError, OutboxEvent, PaymentRepository, PaymentStatus};
use resilience::{presets, CircuitBreaker};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway;

/// Outcome of a single worker invocation, for logging/testing visibility.
/// Never surfaced as an error to the caller — a gateway failure is a
/// legitimate terminal business outcome, not a fault.
#[derive(Debug, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Another worker already holds the lock; nothing was done.
    LockNotAcquired,
    /// The payment no longer exists, or is not PENDING.
    NotActionable,
    Success,
    Failed,
}

/// Drives a single payment through the gateway call and into a terminal
/// state. Acquires the distributed lock on `payment:{payment_id}` for the
/// duration of the call and always releases it before returning, on every
/// path.
pub async fn process_payment(
    payment_id: Uuid,
    repo: &dyn PaymentRepository,
    circuit_breaker: &CircuitBreaker,
) -> anyhow::Result<WorkerOutcome> {
    let resource = format!("payment:{payment_id}");

    let Some(token) = distributed_lock::acquire(&resource).await else {
        return Ok(WorkerOutcome::LockNotAcquired);
    };

    let outcome = run_locked(payment_id, repo, circuit_breaker).await;

    distributed_lock::release(&resource, &token).await;

    outcome
}

async fn run_locked(
    payment_id: Uuid,
    repo: &dyn PaymentRepository,
    circuit_breaker: &CircuitBreaker,
) -> anyhow::Result<WorkerOutcome> {
    let payment = match repo.find_by_id(payment_id).await? {
        Some(payment) => payment,
        None => return Ok(WorkerOutcome::NotActionable),
    };

    if payment.status != PaymentStatus::Pending {
        return Ok(WorkerOutcome::NotActionable);
    }

    let gateway_config = presets::payment_gateway_config();

    let charge_result = resilience::with_timeout_result(gateway_config.timeout.duration, async {
        circuit_breaker
            .call(|| gateway::charge(payment.amount))
            .await
    })
    .await;

    match charge_result {
        Ok(Ok(())) => {
            finish(&payment, PaymentStatus::Success, "payment.success", repo).await?;
            info!(%payment_id, "PAYMENT_SUCCESS");
            Ok(WorkerOutcome::Success)
        }
        Ok(Err(circuit_err)) => {
            warn!(%payment_id, error = %circuit_err, "PAYMENT_GATEWAY_REJECTED");
            finish(&payment, PaymentStatus::Failed, "payment.failed", repo).await?;
            Ok(WorkerOutcome::Failed)
        }
        Err(timeout_err) => {
            warn!(%payment_id, error = %timeout_err, "PAYMENT_GATEWAY_TIMEOUT");
            finish(&payment, PaymentStatus::Failed, "payment.failed", repo).await?;
            Ok(WorkerOutcome::Failed)
        }
    }
}

async fn finish(
    payment: &outbox::Payment,
    status: PaymentStatus,
    event_type: &str,
    repo: &dyn PaymentRepository,
) -> Result<(), OutboxError> {
    let occurred_at = chrono::Utc::now();
    let event = OutboxEvent::new(
        payment.id,
        event_type,
        1,
        json!({
            "payment_id": payment.id,
            "user_id": payment.user_id,
            "amount": payment.amount,
            "currency": payment.currency,
            "occurred_at": occurred_at,
        }),
        occurred_at,
    );

    repo.transition_to_terminal(payment.id, status, &event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use outbox::Payment;
    use std::sync::Mutex;

    struct FakeRepo {
        payment: Mutex<Option<Payment>>,
    }

    #[async_trait]
    impl PaymentRepository for FakeRepo {
        async fn find_by_idempotency_key(&self, _key: &str) -> Result<Option<Payment>, OutboxError> {
            Ok(None)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, OutboxError> {
            let guard = self.payment.lock().unwrap();
            Ok(guard.clone().filter(|p| p.id == id))
        }

        async fn create_with_event(&self, _payment: &Payment, _event: &OutboxEvent) -> Result<(), OutboxError> {
            unimplemented!("not exercised by these tests")
        }

        async fn transition_to_terminal(
            &self,
            payment_id: Uuid,
            status: PaymentStatus,
            _event: &OutboxEvent,
        ) -> Result<(), OutboxError> {
            let mut guard = self.payment.lock().unwrap();
            if let Some(payment) = guard.as_mut() {
                if payment.id == payment_id {
                    payment.status = status;
                }
            }
            Ok(())
        }
    }

    fn pending_payment(id: Uuid) -> Payment {
        Payment {
            id,
            user_id: Uuid::new_v4(),
            amount: 500,
            currency: "USD".to_string(),
            status: PaymentStatus::Pending,
            idempotency_key: "key".to_string(),
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn missing_payment_is_not_actionable() {
        let repo = FakeRepo { payment: Mutex::new(None) };
        let cb = CircuitBreaker::new(Default::default());

        let outcome = run_locked(Uuid::new_v4(), &repo, &cb).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::NotActionable);
    }

    #[tokio::test]
    async fn non_pending_payment_is_not_actionable() {
        let id = Uuid::new_v4();
        let mut payment = pending_payment(id);
        payment.status = PaymentStatus::Success;
        let repo = FakeRepo { payment: Mutex::new(Some(payment)) };
        let cb = CircuitBreaker::new(Default::default());

        let outcome = run_locked(id, &repo, &cb).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::NotActionable);
    }

    #[tokio::test]
    async fn tripped_circuit_breaker_terminates_as_failed() {
        let id = Uuid::new_v4();
        let repo = FakeRepo { payment: Mutex::new(Some(pending_payment(id))) };

        let cb = CircuitBreaker::new(resilience::CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        // Trip the breaker before the real call.
        let _ = cb.call(|| async { Err::<(), _>("boom") }).await;

        let outcome = run_locked(id, &repo, &cb).await.unwrap();
        assert_eq!(outcome, WorkerOutcome::Failed);

        let stored = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
    }
}
