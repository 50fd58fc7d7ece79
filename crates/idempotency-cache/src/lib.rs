//! Redis-backed best-effort cache from an `Idempotency-Key` to the payment
//! id it already produced. A fast-path in front of the Postgres unique
//! constraint on `idempotency_key`, which remains the correctness backstop.

use redis_conn::REDIS_TIMEOUT;
use tracing::warn;
use uuid::Uuid;

/// Cache entry lifetime, matching the write-through TTL of the original
/// system exactly.
pub const CACHE_TTL_SECS: u64 = 300;

fn cache_key(idempotency_key: &str) -> String {
    format!("idempotency:{idempotency_key}")
}

/// Looks up a cached payment id for an idempotency key. Any Redis error or
/// missing connection is a cache miss, never an error surfaced to the
/// caller.
pub async fn get(idempotency_key: &str) -> Option<Uuid> {
    let mut conn = redis_conn::get_connection().await?;

    let result = tokio::time::timeout(
        REDIS_TIMEOUT,
        redis::cmd("GET")
            .arg(cache_key(idempotency_key))
            .query_async::<_, Option<String>>(&mut conn),
    )
    .await;

    match result {
        Ok(Ok(Some(raw))) => Uuid::parse_str(&raw).ok(),
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            warn!(error = %e, "IDEMPOTENCY_CACHE_GET_FAILED");
            None
        }
        Err(_) => {
            warn!("IDEMPOTENCY_CACHE_GET_TIMEOUT");
            None
        }
    }
}

/// Writes through to the cache after a successful create or a cold-cache
/// replay. Failures are logged and swallowed.
pub async fn set(idempotency_key: &str, payment_id: Uuid) {
    let Some(mut conn) = redis_conn::get_connection().await else {
        return;
    };

    let result = tokio::time::timeout(
        REDIS_TIMEOUT,
        redis::cmd("SETEX")
            .arg(cache_key(idempotency_key))
            .arg(CACHE_TTL_SECS)
            .arg(payment_id.to_string())
            .query_async::<_, ()>(&mut conn),
    )
    .await;

    if let Err(_) | Ok(Err(_)) = result {
        warn!(%payment_id, "IDEMPOTENCY_CACHE_WRITE_FAILED");
    }
}
