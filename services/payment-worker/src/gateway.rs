use rand::Rng;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("payment gateway error: {0}")]
pub struct PaymentGatewayError(pub String);

/// Stubbed third-party charge API: ~1s simulated network delay, ~30%
/// simulated failure rate. No real gateway integration exists for this
/// system.
pub async fn charge(_amount: i64) -> Result<(), PaymentGatewayError> {
    tokio::time::sleep(Duration::from_secs(1)).await;

    let failed = rand::thread_rng().gen_bool(0.3);
    if failed {
        return Err(PaymentGatewayError("Gateway timeout".to_string()));
    }

    Ok(())
}
