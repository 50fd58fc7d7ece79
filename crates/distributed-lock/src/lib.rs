//! Redis `SET NX EX` distributed lock with a random fencing token and a
//! Lua-scripted compare-and-delete release, so a worker never releases a
//! lock it no longer owns (e.g. after its TTL expired and another worker
//! picked it up).

use redis::Script;
use redis_conn::REDIS_TIMEOUT;
use tracing::{info, warn};
use uuid::Uuid;

/// Lock time-to-live, matching the original system's `LOCK_TTL` exactly.
pub const LOCK_TTL_SECS: u64 = 30;

/// Opaque fencing token returned by `acquire` and required by `release`.
pub type Token = String;

static RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

fn lock_key(resource: &str) -> String {
    format!("lock:{resource}")
}

/// Attempts to acquire the lock on `resource`. Returns `None` both when the
/// lock is already held by someone else and when Redis is unavailable —
/// in either case the caller treats this as "do not proceed", never as an
/// error to propagate.
pub async fn acquire(resource: &str) -> Option<Token> {
    let mut conn = redis_conn::get_connection().await?;
    let token = Uuid::new_v4().to_string();

    let result = tokio::time::timeout(
        REDIS_TIMEOUT,
        redis::cmd("SET")
            .arg(lock_key(resource))
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(LOCK_TTL_SECS)
            .query_async::<_, Option<String>>(&mut conn),
    )
    .await;

    match result {
        Ok(Ok(Some(_))) => {
            info!(resource, "LOCK_ACQUIRED");
            Some(token)
        }
        Ok(Ok(None)) => {
            info!(resource, "LOCK_ALREADY_HELD");
            None
        }
        Ok(Err(e)) => {
            warn!(resource, error = %e, "LOCK_REDIS_UNAVAILABLE");
            None
        }
        Err(_) => {
            warn!(resource, "LOCK_ACQUIRE_TIMEOUT");
            None
        }
    }
}

/// Releases the lock on `resource` only if `token` still matches the value
/// stored in Redis. Failures are logged and swallowed: the TTL is the
/// ultimate backstop against an orphaned lock.
pub async fn release(resource: &str, token: &Token) {
    let Some(mut conn) = redis_conn::get_connection().await else {
        return;
    };

    let script = Script::new(RELEASE_SCRIPT);
    let result = tokio::time::timeout(
        REDIS_TIMEOUT,
        script
            .key(lock_key(resource))
            .arg(token)
            .invoke_async::<_, i64>(&mut conn),
    )
    .await;

    match result {
        Ok(Ok(1)) => info!(resource, "LOCK_RELEASED"),
        Ok(Ok(_)) => warn!(resource, "LOCK_RELEASE_FAILED"),
        Ok(Err(e)) => warn!(resource, error = %e, "LOCK_RELEASE_FAILED"),
        Err(_) => warn!(resource, "LOCK_RELEASE_TIMEOUT"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_namespaced() {
        assert_eq!(lock_key("payment:123"), "lock:payment:123");
    }

    #[tokio::test]
    async fn acquire_without_redis_is_none() {
        std::env::remove_var("REDIS_URL");
        let result = acquire("payment:no-redis-test").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn release_without_redis_does_not_panic() {
        std::env::remove_var("REDIS_URL");
        release("payment:no-redis-test", &"token".to_string()).await;
    }
}
