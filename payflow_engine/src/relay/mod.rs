//! Outbox relay: drains pending outbox rows to the broker.
use std::time::Duration;

use log::*;
use thiserror::Error;

use crate::{
    broker::{BrokerError, EventPublisher},
    events::{EventEnvelope, ORDER_EVENTS_TOPIC},
    traits::{PipelineDatabase, PipelineError},
};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Database(#[from] PipelineError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("Could not encode envelope: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Sleep between polls when the outbox is empty.
    pub poll_interval: Duration,
    /// Maximum rows drained per tick.
    pub batch_size: i64,
    /// Sleep after an aborted batch before the next attempt.
    pub error_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_millis(1000), batch_size: 10, error_backoff: Duration::from_millis(1000) }
    }
}

/// A single-process background loop that polls unpublished outbox rows, emits them to the broker
/// keyed by aggregate id, and marks them published.
///
/// The publish happens before the mark, so a crash between broker acknowledgement and the
/// database update republishes the row on restart. That is at-least-once delivery, tolerated by
/// downstream idempotency. Rows for one aggregate are published in creation order and share a
/// partition key, so downstream sees per-aggregate FIFO.
pub struct OutboxRelay<B, P> {
    db: B,
    publisher: P,
    config: RelayConfig,
}

impl<B, P> OutboxRelay<B, P>
where
    B: PipelineDatabase,
    P: EventPublisher,
{
    pub fn new(db: B, publisher: P, config: RelayConfig) -> Self {
        Self { db, publisher, config }
    }

    /// The relay loop. Spawn it as a task and do not await it, it runs indefinitely; aborting
    /// the task cancels any in-flight back-off sleep.
    pub async fn run(self) {
        info!(
            "📡️ STARTUP Outbox relay started (batch size {}, poll interval {:?})",
            self.config.batch_size, self.config.poll_interval
        );
        loop {
            match self.tick().await {
                Ok(0) => tokio::time::sleep(self.config.poll_interval).await,
                Ok(n) => debug!("📡️ Published {n} outbox events"),
                Err(e) => {
                    error!("📡️ PROCESSING_ERROR Outbox batch aborted: {e}");
                    if let Ok(backlog) = self.db.count_unpublished().await {
                        if backlog > 0 {
                            warn!("📡️ {backlog} outbox events are waiting to be published");
                        }
                    }
                    tokio::time::sleep(self.config.error_backoff).await;
                },
            }
        }
    }

    /// One drain pass: fetch up to `batch_size` unpublished rows and publish each in order,
    /// marking rows as they are acknowledged. Any error aborts the rest of the batch; rows not
    /// yet marked stay unpublished and are retried next tick.
    pub async fn tick(&self) -> Result<usize, RelayError> {
        let batch = self.db.fetch_unpublished_events(self.config.batch_size).await?;
        let count = batch.len();
        for record in batch {
            let envelope = EventEnvelope::from_outbox_record(&record)?;
            self.publisher.publish(ORDER_EVENTS_TOPIC, &record.aggregate_id, envelope.to_json()?).await?;
            self.db.mark_event_published(&record.event_id).await?;
            trace!("📡️ Event {} ({}) published for aggregate {}", record.event_id, record.event_type, record.aggregate_id);
        }
        Ok(count)
    }
}
