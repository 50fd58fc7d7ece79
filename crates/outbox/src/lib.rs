//! Transactional-outbox write side (payments + outbox_events) and the
//! outbox publisher's drain loop.

pub mod error;
pub mod model;
pub mod processor;
pub mod publisher;
pub mod repository;

pub use error::OutboxError;
pub use model::{OutboxEvent, Payment, PaymentStatus};
pub use processor::OutboxProcessor;
pub use publisher::{build_publisher, BusPublisher, LocalBusPublisher};
pub use repository::{BatchResult, OutboxRepository, PaymentRepository, SqlxOutboxRepository, SqlxPaymentRepository};
