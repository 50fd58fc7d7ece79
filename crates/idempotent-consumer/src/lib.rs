//! Per-event dedup guard backed by the `processed_events` table, used by
//! the notification consumer dispatcher so a redelivered bus message never
//! runs its handler twice.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    Success,
    AlreadyProcessed,
    Failed(String),
}

impl ProcessingResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProcessingResult::Success | ProcessingResult::AlreadyProcessed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessingResult::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub event_id: Uuid,
    pub processed_at: DateTime<Utc>,
}

pub struct IdempotencyGuard {
    pool: PgPool,
}

impl IdempotencyGuard {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn is_processed(&self, event_id: Uuid) -> Result<bool, ConsumerError> {
        let row = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM processed_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row > 0)
    }

    /// Inserts a dedup record. Returns `true` if this call performed the
    /// insert (i.e. the event was new), `false` if a concurrent caller won
    /// the race first.
    pub async fn mark_processed(&self, event_id: Uuid) -> Result<bool, ConsumerError> {
        let result = sqlx::query(
            "INSERT INTO processed_events (event_id, processed_at) VALUES ($1, $2)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Runs `handler` exactly once per `event_id`: marks the event
    /// processed before invoking the handler (matching the original
    /// notification worker's dedup-then-side-effect ordering), and reports
    /// `AlreadyProcessed` without calling `handler` again on a repeat
    /// delivery.
    pub async fn process_if_new<F, Fut>(
        &self,
        event_id: Uuid,
        handler: F,
    ) -> Result<ProcessingResult, ConsumerError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        let inserted = self.mark_processed(event_id).await?;
        if !inserted {
            return Ok(ProcessingResult::AlreadyProcessed);
        }

        match handler().await {
            Ok(()) => Ok(ProcessingResult::Success),
            Err(reason) => Ok(ProcessingResult::Failed(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_result_is_ok() {
        assert!(ProcessingResult::Success.is_ok());
        assert!(ProcessingResult::AlreadyProcessed.is_ok());
        assert!(!ProcessingResult::Failed("boom".into()).is_ok());
    }

    #[test]
    fn processing_result_is_failed() {
        assert!(ProcessingResult::Failed("boom".into()).is_failed());
        assert!(!ProcessingResult::Success.is_failed());
    }

    async fn pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect(&std::env::var("DATABASE_URL").expect("DATABASE_URL"))
            .await
            .expect("connect")
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL database"]
    async fn mark_processed_is_idempotent() {
        let guard = IdempotencyGuard::new(pool().await);
        let event_id = Uuid::new_v4();

        assert!(guard.mark_processed(event_id).await.unwrap());
        assert!(!guard.mark_processed(event_id).await.unwrap());
        assert!(guard.is_processed(event_id).await.unwrap());
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL database"]
    async fn process_if_new_skips_handler_on_replay() {
        let guard = IdempotencyGuard::new(pool().await);
        let event_id = Uuid::new_v4();

        let first = guard.process_if_new(event_id, || async { Ok(()) }).await.unwrap();
        assert_eq!(first, ProcessingResult::Success);

        let second = guard
            .process_if_new(event_id, || async { panic!("handler must not run twice") })
            .await
            .unwrap();
        assert_eq!(second, ProcessingResult::AlreadyProcessed);
    }
}
