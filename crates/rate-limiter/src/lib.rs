//! Fixed-window rate limiter bounding ingress traffic per caller. Always
//! fails open: availability of the payment ingress path outranks strict
//! enforcement, and Redis is optional infrastructure for this system.

use redis_conn::REDIS_TIMEOUT;
use tracing::{info, warn};

/// Requests allowed per window, matching the original system's `RATE_LIMIT`.
pub const RATE_LIMIT: i64 = 10;
/// Window length in seconds, matching the original system's `WINDOW_SECONDS`.
pub const WINDOW_SECONDS: u64 = 60;

fn rate_key(principal: &str) -> String {
    format!("rate:{principal}")
}

/// Returns `true` if `principal` is allowed to proceed. Any Redis error,
/// timeout, or missing connection is logged and treated as allowed.
pub async fn check(principal: &str) -> bool {
    let Some(mut conn) = redis_conn::get_connection().await else {
        warn!(principal, "RATE_LIMIT_REDIS_UNAVAILABLE");
        return true;
    };

    let key = rate_key(principal);
    let result = tokio::time::timeout(
        REDIS_TIMEOUT,
        redis::cmd("INCR").arg(&key).query_async::<_, i64>(&mut conn),
    )
    .await;

    let count = match result {
        Ok(Ok(count)) => count,
        Ok(Err(e)) => {
            warn!(principal, error = %e, "RATE_LIMIT_ERROR");
            return true;
        }
        Err(_) => {
            warn!(principal, "RATE_LIMIT_TIMEOUT");
            return true;
        }
    };

    if count == 1 {
        let expire = tokio::time::timeout(
            REDIS_TIMEOUT,
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(WINDOW_SECONDS)
                .query_async::<_, bool>(&mut conn),
        )
        .await;

        if let Err(_) | Ok(Err(_)) = expire {
            warn!(principal, "RATE_LIMIT_EXPIRE_FAILED");
        }
    }

    if count > RATE_LIMIT {
        info!(principal, count, "RATE_LIMIT_EXCEEDED");
        false
    } else {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_key_is_namespaced() {
        assert_eq!(rate_key("user-1"), "rate:user-1");
    }

    #[tokio::test]
    async fn check_without_redis_fails_open() {
        std::env::remove_var("REDIS_URL");
        assert!(check("user-without-redis").await);
    }
}
