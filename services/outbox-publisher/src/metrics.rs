use actix_web::{get, App, HttpResponse, HttpServer};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static OUTBOX_BACKLOG: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("outbox_backlog", "Unpublished outbox rows").unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static OUTBOX_OLDEST_AGE_SECONDS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "outbox_oldest_unpublished_age_seconds",
        "Age of the oldest unpublished outbox row",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

#[get("/metrics")]
async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// Runs the `/metrics` server alongside the publisher loop. Binds on its own
/// port since this process otherwise never speaks HTTP.
pub async fn serve(bind_addr: &str, port: u16) -> std::io::Result<()> {
    HttpServer::new(|| App::new().service(metrics_handler))
        .bind((bind_addr, port))?
        .run()
        .await
}
