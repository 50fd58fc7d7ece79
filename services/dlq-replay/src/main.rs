use std::time::Duration;

use dlq_replay::{run_once, LocalDlqSource};
use outbox::build_publisher;
use tracing_subscriber::EnvFilter;

/// Delay between replay cycles.
const POLL_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    // Matches the original's hard `os.environ["DLQ_URL"]` lookup: this
    // process refuses to start without it.
    let dlq_url = std::env::var("DLQ_URL").expect("DLQ_URL environment variable is required");
    let event_bus_name = std::env::var("EVENT_BUS_NAME").unwrap_or_else(|_| "default".to_string());

    tracing::info!(dlq_url, event_bus_name, "DLQ_REPLAY_STARTUP");

    let source = LocalDlqSource;
    let publisher = build_publisher();

    loop {
        match run_once(&source, publisher.as_ref()).await {
            Ok(result) if result.is_empty() => tracing::debug!("DLQ_REPLAY_EMPTY"),
            Ok(result) => tracing::info!(
                received = result.received,
                replayed = result.replayed,
                skipped_poison = result.skipped_poison,
                failed = result.failed,
                "DLQ_REPLAY_CYCLE_COMPLETE"
            ),
            Err(e) => tracing::warn!(error = %e, "DLQ_REPLAY_CYCLE_FAILED"),
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
