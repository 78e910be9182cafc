//! Event worker: consumes `OrderCreated` events and advances orders through the state machine.
mod counters;

use std::{sync::Arc, time::Duration};

use log::*;
use thiserror::Error;
use tokio::task::JoinHandle;

pub use counters::{Counters, CountersSnapshot};

use crate::{
    broker::{Delivery, PartitionConsumer},
    db_types::{NewDeadLetter, NewOutboxEvent, OrderState},
    events::{EventEnvelope, EventType, OrderCreatedPayload, OrderEvent, OrderSettledPayload},
    traits::{PaymentError, PaymentService, PaymentStatus, PipelineDatabase, PipelineError},
};

/// The consumer group this worker joins on the order events topic.
pub const PAYMENT_CONSUMER_GROUP: &str = "payment-group";
/// The dedup-ledger scope of this worker. Independent consumer kinds each process an event once.
pub const PAYMENT_WORKER_KIND: &str = "payment-worker";

#[derive(Debug, Error)]
enum WorkerError {
    #[error(transparent)]
    Database(#[from] PipelineError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Per-delivery progress, survives attempts of the retry loop but not a process crash.
#[derive(Debug, Default, Clone, Copy)]
struct DeliveryProgress {
    claimed_version: Option<i64>,
    payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerOutcome {
    /// Terminal state committed by this worker.
    Processed,
    /// The dedup ledger already holds a commit point for this event.
    Duplicate,
    /// Nothing to do: the order is not in `Created`, or this worker lost the settlement race.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Attempts of the whole handler per delivery before the event is dead-lettered.
    pub max_retries: u32,
    /// Sleep between attempts.
    pub retry_backoff: Duration,
    /// How long a partition poll waits before giving the loop back.
    pub poll_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(1000),
            poll_timeout: Duration::from_millis(1000),
        }
    }
}

/// Applies `OrderCreated` events idempotently: a dedup pre-check, a conditional claim to
/// `PaymentPending`, the payment call, and a single transaction committing the terminal state,
/// the follow-up event and the dedup entry together.
///
/// Offsets are committed only after a delivery is fully handled (success, skip or dead-letter),
/// never mid-processing. Partitions are processed serially within a partition and in parallel
/// across partitions.
///
/// Known failure window: a crash after the `PaymentPending` claim but before the terminal commit
/// leaves the order in `PaymentPending` with no dedup entry; redelivery then finds the order
/// outside `Created` and acknowledges without effect, so the order stays pending until a
/// reconciliation sweep picks it up.
pub struct EventWorker<B, P> {
    db: B,
    payments: P,
    config: WorkerConfig,
    counters: Arc<Counters>,
}

impl<B: Clone, P: Clone> Clone for EventWorker<B, P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            payments: self.payments.clone(),
            config: self.config.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<B, P> EventWorker<B, P>
where
    B: PipelineDatabase,
    P: PaymentService,
{
    pub fn new(db: B, payments: P, config: WorkerConfig) -> Self {
        Self { db, payments, config, counters: Arc::new(Counters::default()) }
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Periodically logs a `METRICS` snapshot of the worker counters.
    pub fn spawn_metrics_timer(&self, interval: Duration) -> JoinHandle<()> {
        let counters = self.counters();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                timer.tick().await;
                match serde_json::to_string(&counters.snapshot()) {
                    Ok(json) => info!("⚙️ METRICS {json}"),
                    Err(e) => error!("⚙️ Could not serialize metrics snapshot: {e}"),
                }
            }
        })
    }

    /// The consume loop for one partition. Spawn one task per partition consumer and do not
    /// await them, they run indefinitely; aborting a task cancels any in-flight retry sleep.
    pub async fn run_partition<C: PartitionConsumer>(self, mut consumer: C) {
        info!("⚙️ STARTUP Payment worker consuming partition {}", consumer.partition());
        loop {
            match consumer.poll(self.config.poll_timeout).await {
                Ok(Some(delivery)) => {
                    self.process_delivery(&delivery).await;
                    if let Err(e) = consumer.commit(&delivery).await {
                        error!("⚙️ Could not commit offset {} on partition {}: {e}", delivery.offset, delivery.partition);
                    }
                },
                Ok(None) => {},
                Err(e) => {
                    error!("⚙️ Poll failed on partition {}: {e}", consumer.partition());
                    tokio::time::sleep(self.config.retry_backoff).await;
                },
            }
        }
    }

    /// Handles one delivery to completion. Never escapes an error: every path ends in success,
    /// skip or dead-letter so the partition offset can advance.
    pub async fn process_delivery(&self, delivery: &Delivery) {
        let envelope = match EventEnvelope::from_json(&delivery.value) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("⚙️ PROCESSING_ERROR Malformed envelope on partition {}: {e}", delivery.partition);
                return;
            },
        };
        debug!("⚙️ EVENT_RECEIVED {} [{}] for aggregate {}", envelope.event_type, envelope.event_id, envelope.aggregate_id);

        let payload = match OrderEvent::from_envelope(&envelope) {
            Ok(Some(OrderEvent::Created(payload))) => payload,
            Ok(_) => {
                debug!("⚙️ Ignoring {} [{}]: not consumed by this worker", envelope.event_type, envelope.event_id);
                return;
            },
            Err(e) => {
                // Retrying cannot fix a payload that does not parse
                self.dead_letter(&envelope, format!("Undecodable payload: {e}")).await;
                return;
            },
        };

        // Progress carried across attempts: the version recorded when this delivery claimed the
        // order, so a retry resumes at the payment call instead of finding the order already
        // outside `Created` and giving up, and the payment outcome, so a terminal-commit failure
        // never re-charges.
        let mut progress = DeliveryProgress::default();
        let mut last_error = String::new();
        for attempt in 1..=self.config.max_retries {
            match self.handle_order_created(&envelope, &payload, &mut progress).await {
                Ok(HandlerOutcome::Processed) => {
                    self.counters.event_processed();
                    return;
                },
                Ok(HandlerOutcome::Duplicate) => {
                    self.counters.duplicate_skipped();
                    return;
                },
                Ok(HandlerOutcome::Skipped) => return,
                Err(e) => {
                    error!(
                        "⚙️ PROCESSING_ERROR Attempt {attempt}/{} for event [{}] failed: {e}",
                        self.config.max_retries, envelope.event_id
                    );
                    last_error = e.to_string();
                    if attempt < self.config.max_retries {
                        warn!("⚙️ RETRY_SCHEDULED Event [{}] retries in {:?}", envelope.event_id, self.config.retry_backoff);
                        self.counters.retry_scheduled();
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                },
            }
        }
        self.dead_letter(&envelope, last_error).await;
    }

    /// The staged handler. Each stage is individually idempotent: the claim and the terminal
    /// commit are conditional updates predicated on the exact pre-state, and the dedup insert is
    /// co-committed with the terminal transition so partial progress never poisons the ledger.
    async fn handle_order_created(
        &self,
        envelope: &EventEnvelope,
        payload: &OrderCreatedPayload,
        progress: &mut DeliveryProgress,
    ) -> Result<HandlerOutcome, WorkerError> {
        let order_id = &payload.order_id;

        // advisory dedup pre-check; the binding commit point is written with the terminal state
        if self.db.is_event_processed(&envelope.event_id, PAYMENT_WORKER_KIND).await? {
            info!("⚙️ DUPLICATE_EVENT [{}] already processed for order {order_id}", envelope.event_id);
            return Ok(HandlerOutcome::Duplicate);
        }

        // claim the order. Exactly one worker wins this update; everyone else exits cleanly.
        let v1 = match progress.claimed_version {
            Some(v1) => v1,
            None => match self.db.advance_to_payment_pending(order_id).await? {
                Some(v1) => {
                    info!("⚙️ STATE_CHANGE Order {order_id} Created -> PaymentPending (v{v1})");
                    progress.claimed_version = Some(v1);
                    v1
                },
                None => {
                    debug!("⚙️ Order {order_id} is not in Created; nothing to do for event [{}]", envelope.event_id);
                    return Ok(HandlerOutcome::Skipped);
                },
            },
        };

        // the payment call is the sole non-transactional side effect and runs outside any
        // transaction. At most one call per claimed transition; a retry after a failed terminal
        // commit reuses the recorded outcome.
        let status = match progress.payment_status {
            Some(status) => status,
            None => {
                let status = self.payments.process(order_id, payload.amount).await?;
                info!("⚙️ PAYMENT_RESULT Order {order_id}: {status}");
                progress.payment_status = Some(status);
                status
            },
        };

        // one transaction for terminal state, follow-up event and the dedup commit point
        let (state, event_type) = match status {
            PaymentStatus::Success => (OrderState::Paid, EventType::OrderPaid),
            PaymentStatus::Failed => (OrderState::Failed, EventType::OrderFailed),
        };
        let follow_up = NewOutboxEvent::for_order(
            order_id,
            event_type.to_string(),
            &OrderSettledPayload { order_id: order_id.clone() },
        )
        .map_err(PipelineError::from)?;
        let committed = self
            .db
            .commit_terminal_state(order_id, v1, state, &envelope.event_id, PAYMENT_WORKER_KIND, follow_up)
            .await?;
        if !committed {
            debug!("⚙️ Lost the settlement race for order {order_id}; the peer's commit is authoritative");
            return Ok(HandlerOutcome::Skipped);
        }

        match status {
            PaymentStatus::Success => self.counters.payment_success(),
            PaymentStatus::Failed => self.counters.payment_failed(),
        }
        info!("⚙️ STATE_CHANGE Order {order_id} PaymentPending -> {state} (v{})", v1 + 1);
        Ok(HandlerOutcome::Processed)
    }

    /// Diverts a poison event to the dead-letter table. A failure to record the dead letter is
    /// logged and swallowed: the event is already lost from the normal pipeline, and blocking
    /// the partition helps nothing.
    async fn dead_letter(&self, envelope: &EventEnvelope, reason: String) {
        warn!("⚙️ DLQ_EVENT [{}] dead-lettered after {} attempts: {reason}", envelope.event_id, self.config.max_retries);
        let dead_letter = NewDeadLetter {
            event_id: envelope.event_id.clone(),
            event_type: envelope.event_type.clone(),
            aggregate_id: envelope.aggregate_id.clone(),
            payload: envelope.payload.to_string(),
            reason,
        };
        match self.db.insert_dead_letter(dead_letter).await {
            Ok(()) => self.counters.event_dead_lettered(),
            Err(e) => {
                error!("⚙️ Could not record dead letter for event [{}]: {e}. The event is dropped.", envelope.event_id)
            },
        }
    }
}
