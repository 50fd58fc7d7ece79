use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use outbox::{PaymentRepository, SqlxPaymentRepository};
use payments_api::{config::AppConfig, metrics, routes};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = AppConfig::from_env();

    let db_config = db_pool::DbConfig::from_env("payments-api")
        .expect("DATABASE_URL must be set");
    db_config.log_config();

    let pool = db_pool::create_pool(db_config)
        .await
        .expect("failed to create database pool");

    let repository: Arc<dyn PaymentRepository> = Arc::new(SqlxPaymentRepository::new(pool));

    tracing::info!("APPLICATION_STARTUP");

    HttpServer::new(move || {
        App::new()
            .wrap(http_middleware::RequestIdMiddleware)
            .app_data(web::Data::from(repository.clone()))
            .service(routes::health::health)
            .service(routes::payments::create_payment)
            .service(metrics::metrics)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}
