#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("idempotency key already used")]
    DuplicateIdempotencyKey,
}
