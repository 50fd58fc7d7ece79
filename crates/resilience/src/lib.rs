/// Resilience patterns for async service calls.
///
/// - **Circuit Breaker**: fails fast once an error threshold is reached.
/// - **Timeout**: enforces time limits on external calls.
/// - **Retry**: exponential backoff with jitter for transient failures.
/// - **Preset Configurations**: pre-tuned settings per dependency type.
pub mod circuit_breaker;
pub mod presets;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use presets::{database_config, payment_gateway_config, redis_config, ServiceConfig};
pub use retry::{with_retry, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
