use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use pf_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------      OrderId       ----------------------------------------------------------
/// A lightweight wrapper around the string form of an order's UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      EventId       ----------------------------------------------------------
/// A lightweight wrapper around the string form of an event's UUID. Globally unique across all
/// outbox inserts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     OrderState     ----------------------------------------------------------
/// The order state machine. The only permitted transitions are
/// `Created → PaymentPending`, `PaymentPending → Paid` and `PaymentPending → Failed`.
/// `Paid` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// The order has been accepted by ingress and no payment work has started.
    Created,
    /// The worker has claimed the order and a payment call is in flight (or was interrupted).
    PaymentPending,
    /// The payment succeeded.
    Paid,
    /// The payment was declined.
    Failed,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Paid | OrderState::Failed)
    }
}

impl Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderState::Created => write!(f, "Created"),
            OrderState::PaymentPending => write!(f, "PaymentPending"),
            OrderState::Paid => write!(f, "Paid"),
            OrderState::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order state: {0}")]
pub struct OrderStateConversionError(String);

impl FromStr for OrderState {
    type Err = OrderStateConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "PaymentPending" => Ok(Self::PaymentPending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            s => Err(OrderStateConversionError(s.to_string())),
        }
    }
}

//--------------------------------------       Order        ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: OrderId,
    pub user_id: String,
    pub amount: Money,
    pub state: OrderState,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder      ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Assigned at construction so the order row and the `OrderCreated` payload share one id.
    pub id: OrderId,
    pub user_id: String,
    pub amount: Money,
}

impl NewOrder {
    pub fn new(user_id: String, amount: Money) -> Self {
        Self { id: OrderId::random(), user_id, amount }
    }
}

//--------------------------------------    OutboxRecord    ----------------------------------------------------------
/// A pending outbound event. The payload is opaque JSON text at this layer; it is parsed into a
/// typed variant only inside the consumer that handles it.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxRecord {
    /// Monotonic sequence id, used to break publication-order ties.
    pub id: i64,
    pub event_id: EventId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: String,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   NewOutboxEvent   ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_id: EventId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: String,
}

impl NewOutboxEvent {
    /// A fresh outbox event for an order aggregate, with a newly minted event id.
    pub fn for_order(
        order_id: &OrderId,
        event_type: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: EventId::random(),
            aggregate_type: "order".to_string(),
            aggregate_id: order_id.to_string(),
            event_type: event_type.into(),
            payload: serde_json::to_string(payload)?,
        })
    }
}

//--------------------------------------   ProcessedEvent   ----------------------------------------------------------
/// A dedup ledger entry. One exists iff the worker of that kind has reached a commit point for
/// the event.
#[derive(Debug, Clone, FromRow)]
pub struct ProcessedEvent {
    pub event_id: EventId,
    pub worker_kind: String,
    pub processed_at: DateTime<Utc>,
}

//-------------------------------------- DeadLetterRecord   ----------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct DeadLetterRecord {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: String,
    pub payload: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

//--------------------------------------   NewDeadLetter    ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    pub event_id: EventId,
    pub event_type: String,
    pub aggregate_id: String,
    pub payload: String,
    pub reason: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_state_round_trip() {
        for state in [OrderState::Created, OrderState::PaymentPending, OrderState::Paid, OrderState::Failed] {
            assert_eq!(state.to_string().parse::<OrderState>().unwrap(), state);
        }
        assert!("Shipped".parse::<OrderState>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderState::Created.is_terminal());
        assert!(!OrderState::PaymentPending.is_terminal());
        assert!(OrderState::Paid.is_terminal());
        assert!(OrderState::Failed.is_terminal());
    }

    #[test]
    fn order_state_wire_names() {
        assert_eq!(serde_json::to_string(&OrderState::Created).unwrap(), r#""CREATED""#);
        assert_eq!(serde_json::to_string(&OrderState::PaymentPending).unwrap(), r#""PAYMENT_PENDING""#);
    }

    #[test]
    fn fresh_ids_are_unique() {
        assert_ne!(OrderId::random(), OrderId::random());
        assert_ne!(EventId::random(), EventId::random());
    }
}
