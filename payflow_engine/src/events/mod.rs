//! Event wire format and typed payloads.
//!
//! The [`EventEnvelope`] is the authoritative wire format on the `order-events` topic. Payloads
//! travel as opaque JSON inside the envelope and are parsed into the typed variants of
//! [`OrderEvent`] only inside the consumer that dispatches on them.
mod envelope;
mod event_types;

pub use envelope::EventEnvelope;
pub use event_types::{EventType, OrderCreatedPayload, OrderEvent, OrderSettledPayload, UnknownEventType};

/// The broker topic all order events are published to.
pub const ORDER_EVENTS_TOPIC: &str = "order-events";
