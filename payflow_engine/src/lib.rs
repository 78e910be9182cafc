//! PayFlow Engine
//!
//! The PayFlow engine is the reliable core of an asynchronous order/payment pipeline. Orders and
//! their outgoing events are written atomically to a durable outbox; a relay drains the outbox to
//! a partitioned event broker with at-least-once delivery; an idempotent worker consumes the
//! events and advances each order through its state machine, with bounded retry and a dead-letter
//! sink for poison messages.
//!
//! The library is divided into three main sections:
//! 1. Database management and control. SQLite is the supported backend. You should never need to
//!    access the database directly. Instead, use the public API provided by the engine. The
//!    exception is the data types used in the database, defined in the `db_types` module.
//! 2. The broker seam. The [`broker`] module defines the publisher/consumer contract the relay
//!    and worker are written against, together with [`broker::MemoryBroker`], an embedded
//!    partitioned log with consumer groups and committed offsets.
//! 3. Pipeline components. [`OrderFlowApi`] is the ingress write protocol, [`OutboxRelay`] drains
//!    the outbox, and [`EventWorker`] applies the order state machine.
pub mod broker;
pub mod db_types;
pub mod events;
mod order_flow;
mod relay;
pub mod sqlite;
pub mod test_utils;
pub mod traits;
mod worker;

pub use order_flow::OrderFlowApi;
pub use relay::{OutboxRelay, RelayConfig, RelayError};
pub use sqlite::SqliteDatabase;
pub use worker::{
    Counters, CountersSnapshot, EventWorker, WorkerConfig, PAYMENT_CONSUMER_GROUP, PAYMENT_WORKER_KIND,
};
