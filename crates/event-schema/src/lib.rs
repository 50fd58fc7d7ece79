//! Wire format shared by the outbox publisher, the consumer dispatcher, and
//! the DLQ replay job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currently the only schema version this system emits or accepts. Kept as
/// a named constant rather than inlined so a future bump has one place to
/// change.
pub const SCHEMA_VERSION: i32 = 1;

/// The event envelope placed on the bus by the outbox publisher and read
/// back by the consumer dispatcher and DLQ replay job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub version: i32,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Checks whether a received `version` matches the `expected` version for a
/// consumer. Exact-match only today; this is a placeholder for future
/// semver-style compatibility ranges, not an implemented feature.
pub fn is_compatible(expected: i32, received: i32) -> bool {
    expected == received
}

/// A payload missing `payment_id` is not a valid payment event for this
/// system, regardless of `event_type`.
pub fn has_payment_id(payload: &serde_json::Value) -> bool {
    payload.get("payment_id").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_is_exact_match_only() {
        assert!(is_compatible(1, 1));
        assert!(!is_compatible(1, 2));
        assert!(!is_compatible(2, 1));
    }

    #[test]
    fn payload_without_payment_id_is_rejected() {
        assert!(!has_payment_id(&json!({"amount": 100})));
        assert!(has_payment_id(&json!({"payment_id": "x"})));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = EventEnvelope {
            event_id: Uuid::new_v4(),
            event_type: "payment.created".to_string(),
            aggregate_id: Uuid::new_v4(),
            version: SCHEMA_VERSION,
            occurred_at: Utc::now(),
            payload: json!({"payment_id": "abc"}),
        };

        let serialized = serde_json::to_string(&envelope).unwrap();
        let deserialized: EventEnvelope = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.event_id, envelope.event_id);
        assert_eq!(deserialized.version, SCHEMA_VERSION);
    }
}
