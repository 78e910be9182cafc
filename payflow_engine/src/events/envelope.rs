use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{EventId, OutboxRecord};

/// The canonical JSON envelope published to the broker.
///
/// Field names are the wire contract; consumers in other services parse on them. The partition
/// key is `aggregate_id`, so all events for one aggregate land on one partition in creation
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn from_outbox_record(record: &OutboxRecord) -> Result<Self, serde_json::Error> {
        let payload = serde_json::from_str(&record.payload)?;
        Ok(Self {
            event_id: record.event_id.clone(),
            event_type: record.event_type.clone(),
            aggregate_type: record.aggregate_type.clone(),
            aggregate_id: record.aggregate_id.clone(),
            payload,
            created_at: record.created_at,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn wire_field_names_are_camel_case() {
        let envelope = EventEnvelope {
            event_id: EventId::from("e-1".to_string()),
            event_type: "OrderCreated".to_string(),
            aggregate_type: "order".to_string(),
            aggregate_id: "o-1".to_string(),
            payload: serde_json::json!({ "orderId": "o-1" }),
            created_at: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
        };
        let json = envelope.to_json().unwrap();
        for key in ["eventId", "eventType", "aggregateType", "aggregateId", "payload", "createdAt"] {
            assert!(json.contains(key), "missing wire key {key} in {json}");
        }
        let parsed = EventEnvelope::from_json(&json).unwrap();
        assert_eq!(parsed.event_id, envelope.event_id);
        assert_eq!(parsed.created_at, envelope.created_at);
    }

    #[test]
    fn round_trip_through_outbox_record() {
        let record = OutboxRecord {
            id: 7,
            event_id: EventId::from("e-7".to_string()),
            aggregate_type: "order".to_string(),
            aggregate_id: "o-7".to_string(),
            event_type: "OrderPaid".to_string(),
            payload: r#"{"orderId":"o-7"}"#.to_string(),
            published: false,
            published_at: None,
            created_at: Utc::now(),
        };
        let envelope = EventEnvelope::from_outbox_record(&record).unwrap();
        assert_eq!(envelope.payload["orderId"], "o-7");
        assert_eq!(envelope.event_type, "OrderPaid");
    }
}
