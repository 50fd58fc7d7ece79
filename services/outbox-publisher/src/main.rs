mod metrics;

use std::sync::Arc;
use std::time::Duration;

use outbox::{build_publisher, OutboxProcessor, OutboxRepository, SqlxOutboxRepository};
use tracing_subscriber::EnvFilter;

const STATS_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let db_config = db_pool::DbConfig::from_env("outbox-publisher").map_err(anyhow::Error::msg)?;
    let pool = db_pool::create_pool(db_config).await?;

    let repository = Arc::new(SqlxOutboxRepository::new(pool));
    let publisher = build_publisher();

    tracing::info!("OUTBOX_PUBLISHER_STARTUP");

    let stats_repository = repository.clone();
    tokio::spawn(async move {
        loop {
            match stats_repository.pending_stats().await {
                Ok((count, oldest_age)) => {
                    metrics::OUTBOX_BACKLOG.set(count);
                    metrics::OUTBOX_OLDEST_AGE_SECONDS.set(oldest_age);
                }
                Err(e) => tracing::warn!(error = %e, "OUTBOX_STATS_POLL_FAILED"),
            }
            tokio::time::sleep(STATS_POLL_INTERVAL).await;
        }
    });

    let metrics_port: u16 = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(9100);
    tokio::spawn(async move {
        if let Err(e) = metrics::serve("0.0.0.0", metrics_port).await {
            tracing::warn!(error = %e, "OUTBOX_METRICS_SERVER_FAILED");
        }
    });

    let processor = OutboxProcessor::new(repository, publisher);
    processor.start().await;
}
