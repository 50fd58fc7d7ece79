//! Lazily-established Redis connection shared by the cache, lock and rate
//! limiter crates. Redis is optional infrastructure for this system: a
//! missing `REDIS_URL`, a failed connect, or a failed `PING` all degrade to
//! "no Redis available" rather than panicking the process. Every caller is
//! expected to treat `None` as a permanent-for-this-process cache miss.

use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::warn;

/// Connect and read/write timeout applied to every Redis round trip,
/// matching the original system's connection settings exactly.
pub const REDIS_TIMEOUT: Duration = Duration::from_secs(1);

static CONNECTION: OnceCell<Option<ConnectionManager>> = OnceCell::const_new();

/// Returns a cloneable connection manager, or `None` if Redis is unavailable.
/// The connection is established once per process and cached; a failure is
/// cached too; it is not retried until the process restarts.
pub async fn get_connection() -> Option<ConnectionManager> {
    CONNECTION
        .get_or_init(|| async { connect().await })
        .await
        .clone()
}

async fn connect() -> Option<ConnectionManager> {
    let url = match std::env::var("REDIS_URL") {
        Ok(url) => url,
        Err(_) => {
            warn!("REDIS_URL_NOT_SET");
            return None;
        }
    };

    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "REDIS_CLIENT_INVALID");
            return None;
        }
    };

    let manager = match tokio::time::timeout(REDIS_TIMEOUT, client.get_connection_manager()).await
    {
        Ok(Ok(manager)) => manager,
        Ok(Err(e)) => {
            warn!(error = %e, "REDIS_CONNECT_FAILED");
            return None;
        }
        Err(_) => {
            warn!("REDIS_CONNECT_TIMEOUT");
            return None;
        }
    };

    let mut ping_conn = manager.clone();
    match tokio::time::timeout(
        REDIS_TIMEOUT,
        redis::cmd("PING").query_async::<_, String>(&mut ping_conn),
    )
    .await
    {
        Ok(Ok(_)) => Some(manager),
        Ok(Err(e)) => {
            warn!(error = %e, "REDIS_PING_FAILED");
            None
        }
        Err(_) => {
            warn!("REDIS_PING_TIMEOUT");
            None
        }
    }
}
