//! The broker seam.
//!
//! The relay and worker are written against [`EventPublisher`] and [`PartitionConsumer`], the
//! minimal contract of a partitioned, ordered, at-least-once log with consumer groups:
//! messages with the same key land on the same partition in publish order, each consumer group
//! tracks a committed offset per partition, and anything delivered but not committed is
//! redelivered to the next subscriber.
//!
//! [`MemoryBroker`] is the embedded implementation used by the server binary and the tests. A
//! networked broker client slots in behind the same two traits.
mod memory;

use std::time::Duration;

use thiserror::Error;

pub use memory::{MemoryBroker, MemoryPartitionConsumer};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Broker rejected the message: {0}")]
    Rejected(String),
    #[error("Commit refused: {0}")]
    CommitFailed(String),
}

/// A message handed to a consumer, with the coordinates needed to commit it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub key: String,
    pub value: String,
    pub partition: usize,
    pub offset: usize,
}

/// A single logical producer. `publish` resolves once the broker has durably acknowledged the
/// message.
#[allow(async_fn_in_trait)]
pub trait EventPublisher: Clone + Send + Sync {
    async fn publish(&self, topic: &str, key: &str, value: String) -> Result<(), BrokerError>;
}

/// One partition's view for one consumer group. Messages on a partition are processed strictly
/// serially; offsets are committed only after the handler has finished with the delivery.
#[allow(async_fn_in_trait)]
pub trait PartitionConsumer: Send {
    fn partition(&self) -> usize;

    /// The next uncommitted message, or `None` once `timeout` elapses with nothing to read.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Delivery>, BrokerError>;

    /// Commits every offset up to and including `delivery` for this group.
    async fn commit(&mut self, delivery: &Delivery) -> Result<(), BrokerError>;
}
