use std::{fmt::Display, str::FromStr};

use pf_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{db_types::OrderId, events::EventEnvelope};

//--------------------------------------     EventType      ----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    OrderCreated,
    OrderPaid,
    OrderFailed,
}

impl Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::OrderCreated => write!(f, "OrderCreated"),
            EventType::OrderPaid => write!(f, "OrderPaid"),
            EventType::OrderFailed => write!(f, "OrderFailed"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OrderCreated" => Ok(Self::OrderCreated),
            "OrderPaid" => Ok(Self::OrderPaid),
            "OrderFailed" => Ok(Self::OrderFailed),
            s => Err(UnknownEventType(s.to_string())),
        }
    }
}

//--------------------------------------     Payloads       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedPayload {
    pub order_id: OrderId,
    pub user_id: String,
    pub amount: Money,
}

/// Payload of the `OrderPaid` and `OrderFailed` follow-up events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSettledPayload {
    pub order_id: OrderId,
}

//--------------------------------------     OrderEvent     ----------------------------------------------------------
/// Typed view of an envelope, dispatched on the `eventType` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Created(OrderCreatedPayload),
    Paid(OrderSettledPayload),
    Failed(OrderSettledPayload),
}

impl OrderEvent {
    /// Parse the envelope's payload into a typed event. Returns `None` for tags this pipeline
    /// does not know; callers acknowledge those without effect.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Option<Self>, serde_json::Error> {
        let event = match envelope.event_type.parse::<EventType>() {
            Ok(EventType::OrderCreated) => {
                Some(OrderEvent::Created(serde_json::from_value(envelope.payload.clone())?))
            },
            Ok(EventType::OrderPaid) => Some(OrderEvent::Paid(serde_json::from_value(envelope.payload.clone())?)),
            Ok(EventType::OrderFailed) => {
                Some(OrderEvent::Failed(serde_json::from_value(envelope.payload.clone())?))
            },
            Err(_) => None,
        };
        Ok(event)
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::EventId;

    fn envelope(event_type: &str, payload: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            event_id: EventId::random(),
            event_type: event_type.to_string(),
            aggregate_type: "order".to_string(),
            aggregate_id: "o-1".to_string(),
            payload,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dispatches_on_tag() {
        let env = envelope(
            "OrderCreated",
            serde_json::json!({ "orderId": "o-1", "userId": "u-1", "amount": 12.5 }),
        );
        match OrderEvent::from_envelope(&env).unwrap() {
            Some(OrderEvent::Created(p)) => {
                assert_eq!(p.order_id.as_str(), "o-1");
                assert_eq!(p.amount, Money::from_cents(1250));
            },
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn unknown_tags_are_none() {
        let env = envelope("OrderShipped", serde_json::json!({}));
        assert!(OrderEvent::from_envelope(&env).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let env = envelope("OrderCreated", serde_json::json!({ "orderId": "o-1" }));
        assert!(OrderEvent::from_envelope(&env).is_err());
    }
}
