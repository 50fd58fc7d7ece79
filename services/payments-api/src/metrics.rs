use actix_web::{get, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static PAYMENTS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("payments_created_total", "Payments created").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static PAYMENTS_REPLAYED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "payments_idempotent_replays_total",
        "Requests that matched an existing idempotency key",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static RATE_LIMIT_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("rate_limit_rejections_total", "Requests rejected by the rate limiter").unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static HTTP_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("payments_api_errors_total", "Errors returned by the ingress API"),
        &["error_code"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

#[get("/metrics")]
pub async fn metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
