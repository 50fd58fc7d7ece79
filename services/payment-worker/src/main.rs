use outbox::SqlxPaymentRepository;
use resilience::CircuitBreaker;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let payment_ids: Vec<Uuid> = std::env::args()
        .skip(1)
        .filter_map(|arg| Uuid::parse_str(&arg).ok())
        .collect();

    if payment_ids.is_empty() {
        anyhow::bail!("usage: payment-worker <payment_id> [payment_id...]");
    }

    let db_config = db_pool::DbConfig::from_env("payment-worker")
        .map_err(anyhow::Error::msg)?;
    let pool = db_pool::create_pool(db_config).await?;
    let repo = SqlxPaymentRepository::new(pool);

    // One breaker shared across the whole invocation so consecutive
    // failures within a batch trip it, matching the single-process
    // lifetime the gateway preset is tuned for.
    let circuit_breaker = CircuitBreaker::new(resilience::presets::payment_gateway_config().circuit_breaker);

    for payment_id in payment_ids {
        match payment_worker::process_payment(payment_id, &repo, &circuit_breaker).await {
            Ok(outcome) => tracing::info!(%payment_id, outcome = ?outcome, "PAYMENT_WORKER_DONE"),
            Err(e) => tracing::error!(%payment_id, error = %e, "PAYMENT_WORKER_FAILED"),
        }
    }

    Ok(())
}
