use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actix_web::{get, post, web, App, HttpResponse, HttpServer};
use event_schema::EventEnvelope;
use idempotent_consumer::IdempotencyGuard;
use notification_consumer::dispatch;
use outbox::SqlxPaymentRepository;
use resilience::CircuitBreaker;
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct AppState {
    guard: IdempotencyGuard,
    payment_repo: SqlxPaymentRepository,
    gateway_breaker: CircuitBreaker,
    ready: AtomicBool,
}

#[get("/notifications/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "alive"}))
}

#[get("/notifications/ready")]
async fn ready(state: web::Data<Arc<AppState>>) -> HttpResponse {
    if state.ready.load(Ordering::Relaxed) {
        HttpResponse::Ok().json(json!({"status": "ready"}))
    } else {
        HttpResponse::ServiceUnavailable().json(json!({"status": "not_ready"}))
    }
}

#[post("/dispatch")]
async fn dispatch_event(
    state: web::Data<Arc<AppState>>,
    body: web::Json<EventEnvelope>,
) -> HttpResponse {
    match dispatch(&body, &state.guard, &state.payment_repo, &state.gateway_breaker).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({"outcome": format!("{outcome:?}")})),
        Err(reason) => {
            // The one place in this system an error surfaces: the bus-level
            // caller should treat this as a failed delivery and redeliver.
            tracing::error!(error = %reason, "NOTIFICATION_HANDLER_FAILED");
            HttpResponse::InternalServerError().json(json!({"error": reason}))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let db_config = db_pool::DbConfig::from_env("notification-consumer")
        .expect("DATABASE_URL must be set");
    let pool = db_pool::create_pool(db_config)
        .await
        .expect("failed to create database pool");

    // Redis is optional infrastructure everywhere in this system; readiness
    // records whether it is reachable but never blocks on it.
    let redis_available = redis_conn::get_connection().await.is_some();
    tracing::info!(redis_available, "NOTIFICATION_CONSUMER_DEPENDENCIES_CHECKED");

    let gateway_breaker = CircuitBreaker::new(resilience::presets::payment_gateway_config().circuit_breaker);

    let state = Arc::new(AppState {
        guard: IdempotencyGuard::new(pool.clone()),
        payment_repo: SqlxPaymentRepository::new(pool),
        gateway_breaker,
        ready: AtomicBool::new(true),
    });

    tracing::info!("NOTIFICATION_CONSUMER_STARTUP");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(health)
            .service(ready)
            .service(dispatch_event)
    })
    .bind(("0.0.0.0", 8081))?
    .run()
    .await
}
