use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::OutboxError;
use crate::model::{OutboxEvent, Payment, PaymentStatus};

/// Write and read access to the `payments` table, always alongside an
/// outbox event in the same transaction (I1: exactly one Payment row per
/// idempotency key, ever, with no partial state visible to a caller).
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, OutboxError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, OutboxError>;

    /// Inserts the payment row and its `payment.created` outbox event in a
    /// single transaction. A unique-constraint violation on
    /// `idempotency_key` is reported as `OutboxError::DuplicateIdempotencyKey`
    /// rather than a generic database error, so callers can treat it as a
    /// replay race rather than a fault.
    async fn create_with_event(
        &self,
        payment: &Payment,
        event: &OutboxEvent,
    ) -> Result<(), OutboxError>;

    /// Transitions a PENDING payment to a terminal status and records the
    /// corresponding outbox event atomically. `processed_at` is set to
    /// `event.occurred_at`, so the payment row and its outbox event agree on
    /// when the transition happened. Never invoked on a payment that is not
    /// PENDING (I7 is enforced by the caller's precondition check, not
    /// here).
    async fn transition_to_terminal(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        event: &OutboxEvent,
    ) -> Result<(), OutboxError>;
}

pub struct SqlxPaymentRepository {
    pool: PgPool,
}

impl SqlxPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_payment(row: &sqlx::postgres::PgRow) -> Result<Payment, OutboxError> {
    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse::<PaymentStatus>()
        .map_err(|_| OutboxError::Database(sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: "invalid payment status".into(),
        }))?;

    Ok(Payment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        status,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &OutboxEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO outbox_events
            (id, event_id, aggregate_id, event_type, version, payload, occurred_at, created_at, published_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(event.id)
    .bind(event.event_id)
    .bind(event.aggregate_id)
    .bind(&event.event_type)
    .bind(event.version)
    .bind(&event.payload)
    .bind(event.occurred_at)
    .bind(event.created_at)
    .bind(event.published_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl PaymentRepository for SqlxPaymentRepository {
    async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, OutboxError> {
        let row = sqlx::query("SELECT * FROM payments WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, OutboxError> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn create_with_event(
        &self,
        payment: &Payment,
        event: &OutboxEvent,
    ) -> Result<(), OutboxError> {
        let mut tx = self.pool.begin().await?;

        let insert_result = sqlx::query(
            "INSERT INTO payments
                (id, user_id, amount, currency, status, idempotency_key, created_at, processed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.idempotency_key)
        .bind(payment.created_at)
        .bind(payment.processed_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert_result {
            if is_unique_violation(&e) {
                return Err(OutboxError::DuplicateIdempotencyKey);
            }
            return Err(e.into());
        }

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn transition_to_terminal(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        event: &OutboxEvent,
    ) -> Result<(), OutboxError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE payments SET status = $1, processed_at = $2 WHERE id = $3 AND status = 'PENDING'",
        )
        .bind(status.as_str())
        .bind(event.occurred_at)
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;

        insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Publisher-side access to `outbox_events`: selecting unpublished rows
/// under `FOR UPDATE SKIP LOCKED` and marking them published, matching the
/// corpus's `OutboxRepository` shape.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Selects up to `limit` unpublished rows under `FOR UPDATE SKIP
    /// LOCKED`, hands each to `publisher`, marks the successes published,
    /// and commits once at the end of the batch. Rows whose publish call
    /// fails are left unpublished and picked up on a later poll — this is
    /// what makes concurrent publisher instances safe (I4): two processes
    /// never mark the same row published twice, and a mid-batch crash
    /// leaves only the already-committed rows marked.
    async fn process_batch(
        &self,
        limit: i64,
        publisher: &dyn crate::publisher::BusPublisher,
    ) -> Result<BatchResult, OutboxError>;

    /// `(unpublished_count, oldest_unpublished_age_seconds)`.
    async fn pending_stats(&self) -> Result<(i64, i64), OutboxError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchResult {
    pub selected: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct SqlxOutboxRepository {
    pool: PgPool,
}

impl SqlxOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<OutboxEvent, OutboxError> {
    Ok(OutboxEvent {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        version: row.try_get("version")?,
        payload: row.try_get("payload")?,
        occurred_at: row.try_get("occurred_at")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
    })
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn process_batch(
        &self,
        limit: i64,
        publisher: &dyn crate::publisher::BusPublisher,
    ) -> Result<BatchResult, OutboxError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT * FROM outbox_events
             WHERE published_at IS NULL
             ORDER BY occurred_at ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let events: Vec<OutboxEvent> = rows.iter().map(row_to_event).collect::<Result<_, _>>()?;
        let mut result = BatchResult {
            selected: events.len(),
            ..Default::default()
        };

        for event in &events {
            let envelope = event.to_envelope();

            if !crate::publisher::validate_payload(&envelope) {
                result.failed += 1;
                continue;
            }

            match publisher.publish(&envelope).await {
                Ok(()) => {
                    sqlx::query("UPDATE outbox_events SET published_at = NOW() WHERE event_id = $1")
                        .bind(event.event_id)
                        .execute(&mut *tx)
                        .await?;
                    result.published += 1;
                }
                Err(e) => {
                    tracing::warn!(event_id = %event.event_id, error = %e, "OUTBOX_PUBLISH_FAILED");
                    result.failed += 1;
                }
            }
        }

        tx.commit().await?;
        Ok(result)
    }

    async fn pending_stats(&self) -> Result<(i64, i64), OutboxError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count,
                    COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(occurred_at)))::BIGINT, 0) AS oldest_age
             FROM outbox_events
             WHERE published_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok((row.try_get("count")?, row.try_get("oldest_age")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutboxEvent;
    use crate::publisher::LocalBusPublisher;
    use serde_json::json;

    async fn pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect(&std::env::var("DATABASE_URL").expect("DATABASE_URL"))
            .await
            .expect("connect")
    }

    fn sample_payment(idempotency_key: &str) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: 1000,
            currency: "USD".to_string(),
            status: PaymentStatus::Pending,
            idempotency_key: idempotency_key.to_string(),
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL database"]
    async fn duplicate_idempotency_key_is_rejected() {
        let repo = SqlxPaymentRepository::new(pool().await);
        let key = format!("test-{}", Uuid::new_v4());
        let payment = sample_payment(&key);
        let event = OutboxEvent::new(
            payment.id,
            "payment.created",
            1,
            json!({"payment_id": payment.id}),
            Utc::now(),
        );

        repo.create_with_event(&payment, &event).await.unwrap();

        let duplicate = sample_payment(&key);
        let duplicate_event = OutboxEvent::new(
            duplicate.id,
            "payment.created",
            1,
            json!({"payment_id": duplicate.id}),
            Utc::now(),
        );

        let result = repo.create_with_event(&duplicate, &duplicate_event).await;
        assert!(matches!(result, Err(OutboxError::DuplicateIdempotencyKey)));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL database"]
    async fn process_batch_marks_published_rows() {
        let pg_pool = pool().await;
        let payment_repo = SqlxPaymentRepository::new(pg_pool.clone());
        let outbox_repo = SqlxOutboxRepository::new(pg_pool);

        let payment = sample_payment(&format!("batch-{}", Uuid::new_v4()));
        let event = OutboxEvent::new(
            payment.id,
            "payment.created",
            1,
            json!({"payment_id": payment.id}),
            Utc::now(),
        );
        payment_repo.create_with_event(&payment, &event).await.unwrap();

        let result = outbox_repo
            .process_batch(10, &LocalBusPublisher)
            .await
            .unwrap();

        assert!(result.published >= 1);
    }
}
