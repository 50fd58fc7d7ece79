use actix_web::{post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use error_types::ServiceError;
use outbox::{OutboxEvent, Payment, PaymentRepository, PaymentStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::metrics;

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
}

/// Always `status: "accepted"` regardless of the payment's current
/// processing state: this is an acknowledgement that the intent was
/// durably recorded, not a report of gateway outcome.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub status: &'static str,
    pub payment_id: Uuid,
    pub idempotency_key: String,
}

impl PaymentResponse {
    fn accepted(payment_id: Uuid, idempotency_key: &str) -> HttpResponse {
        HttpResponse::Accepted().json(PaymentResponse {
            status: "accepted",
            payment_id,
            idempotency_key: idempotency_key.to_string(),
        })
    }
}

fn validate(request: &CreatePaymentRequest) -> Result<(), ServiceError> {
    if request.amount <= 0 {
        return Err(ServiceError::ValidationError(
            "amount must be a positive integer".to_string(),
        ));
    }

    let currency = request.currency.as_str();
    let is_iso4217_shaped = currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase());
    if !is_iso4217_shaped {
        return Err(ServiceError::ValidationError(
            "currency must be a 3-letter uppercase ISO-4217 code".to_string(),
        ));
    }

    Ok(())
}

fn error_response(req: &HttpRequest, err: &ServiceError) -> HttpResponse {
    metrics::HTTP_ERRORS.with_label_values(&[err.error_code()]).inc();
    let body = err.to_response();
    tracing::warn!(
        request_id = %http_middleware::get_request_id(req).unwrap_or_default(),
        error_code = err.error_code(),
        "PAYMENT_REQUEST_REJECTED"
    );
    HttpResponse::build(
        actix_web::http::StatusCode::from_u16(body.status).unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR),
    )
    .json(body)
}

#[post("/payments")]
pub async fn create_payment(
    req: HttpRequest,
    body: web::Json<CreatePaymentRequest>,
    repo: web::Data<dyn PaymentRepository>,
) -> HttpResponse {
    let idempotency_key = match req
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => {
            return error_response(
                &req,
                &ServiceError::BadRequest("Idempotency-Key header is required".to_string()),
            )
        }
    };

    if !rate_limiter::check(&body.user_id.to_string()).await {
        metrics::RATE_LIMIT_REJECTIONS.inc();
        return HttpResponse::TooManyRequests()
            .insert_header(("Retry-After", rate_limiter::WINDOW_SECONDS.to_string()))
            .json(ServiceError::Throttled.to_response());
    }

    if let Err(e) = validate(&body) {
        return error_response(&req, &e);
    }

    if let Some(payment_id) = idempotency_cache::get(&idempotency_key).await {
        metrics::PAYMENTS_REPLAYED.inc();
        return match repo.find_by_id(payment_id).await {
            Ok(Some(payment)) => PaymentResponse::accepted(payment.id, &idempotency_key),
            Ok(None) => {
                // Cache pointed at a row that no longer exists; fall through
                // to the database lookup below rather than failing.
                respond_with_db_lookup(&req, &idempotency_key, &body, &repo).await
            }
            Err(e) => error_response(&req, &to_service_error(e)),
        };
    }

    respond_with_db_lookup(&req, &idempotency_key, &body, &repo).await
}

async fn respond_with_db_lookup(
    req: &HttpRequest,
    idempotency_key: &str,
    body: &CreatePaymentRequest,
    repo: &web::Data<dyn PaymentRepository>,
) -> HttpResponse {
    match repo.find_by_idempotency_key(idempotency_key).await {
        Ok(Some(payment)) => {
            metrics::PAYMENTS_REPLAYED.inc();
            idempotency_cache::set(idempotency_key, payment.id).await;
            PaymentResponse::accepted(payment.id, idempotency_key)
        }
        Ok(None) => create_new_payment(req, idempotency_key, body, repo).await,
        Err(e) => error_response(req, &to_service_error(e)),
    }
}

async fn create_new_payment(
    req: &HttpRequest,
    idempotency_key: &str,
    body: &CreatePaymentRequest,
    repo: &web::Data<dyn PaymentRepository>,
) -> HttpResponse {
    let payment = Payment {
        id: Uuid::new_v4(),
        user_id: body.user_id,
        amount: body.amount,
        currency: body.currency.clone(),
        status: PaymentStatus::Pending,
        idempotency_key: idempotency_key.to_string(),
        created_at: Utc::now(),
        processed_at: None,
    };

    let event = OutboxEvent::new(
        payment.id,
        "payment.created",
        1,
        json!({
            "payment_id": payment.id,
            "user_id": payment.user_id,
            "amount": payment.amount,
            "currency": payment.currency,
        }),
        payment.created_at,
    );

    match repo.create_with_event(&payment, &event).await {
        Ok(()) => {
            metrics::PAYMENTS_CREATED.inc();
            idempotency_cache::set(idempotency_key, payment.id).await;
            PaymentResponse::accepted(payment.id, idempotency_key)
        }
        Err(outbox::OutboxError::DuplicateIdempotencyKey) => {
            // Lost a race against a concurrent request with the same key.
            respond_with_db_lookup(req, idempotency_key, body, repo).await
        }
        Err(e) => error_response(req, &to_service_error(e)),
    }
}

fn to_service_error(err: outbox::OutboxError) -> ServiceError {
    match err {
        outbox::OutboxError::Database(e) => e.into(),
        outbox::OutboxError::DuplicateIdempotencyKey => {
            ServiceError::Conflict("idempotency_key already used".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_amount() {
        let request = CreatePaymentRequest {
            user_id: Uuid::new_v4(),
            amount: 0,
            currency: "USD".to_string(),
        };
        assert!(validate(&request).is_err());
    }

    #[test]
    fn rejects_lowercase_currency() {
        let request = CreatePaymentRequest {
            user_id: Uuid::new_v4(),
            amount: 100,
            currency: "usd".to_string(),
        };
        assert!(validate(&request).is_err());
    }

    #[test]
    fn rejects_wrong_length_currency() {
        let request = CreatePaymentRequest {
            user_id: Uuid::new_v4(),
            amount: 100,
            currency: "US".to_string(),
        };
        assert!(validate(&request).is_err());
    }

    #[test]
    fn accepts_valid_request() {
        let request = CreatePaymentRequest {
            user_id: Uuid::new_v4(),
            amount: 500,
            currency: "EUR".to_string(),
        };
        assert!(validate(&request).is_ok());
    }
}
