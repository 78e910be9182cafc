use thiserror::Error;

use crate::db_types::{
    DeadLetterRecord, EventId, NewDeadLetter, NewOrder, NewOutboxEvent, Order, OrderId, OrderState, OutboxRecord,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Could not encode event payload: {0}")]
    PayloadEncoding(#[from] serde_json::Error),
}

/// The transactional write protocol shared by ingress, relay and worker.
///
/// All writes to `orders` are conditional updates predicated on the exact pre-state
/// (`state = X AND version = V`). There are no advisory locks and no `SELECT ... FOR UPDATE`;
/// the dedup ledger and outbox rely on unique-constraint violations as the serialization point.
#[allow(async_fn_in_trait)]
pub trait PipelineDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Inserts a new order in state `Created` with `version = 0` and its `OrderCreated` outbox
    /// row in one transaction. Either both rows commit or neither does.
    async fn create_order_with_event(&self, order: NewOrder) -> Result<Order, PipelineError>;

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, PipelineError>;

    /// Unpublished outbox rows in creation order (ties broken by sequence id), at most `limit`.
    async fn fetch_unpublished_events(&self, limit: i64) -> Result<Vec<OutboxRecord>, PipelineError>;

    /// Marks an outbox row published and stamps `published_at`. Safe to call twice; once
    /// published a row is never republished.
    async fn mark_event_published(&self, event_id: &EventId) -> Result<(), PipelineError>;

    /// Size of the unpublished backlog, for alerting when the broker is down.
    async fn count_unpublished(&self) -> Result<i64, PipelineError>;

    /// Whether the dedup ledger holds a commit point for `(event_id, worker_kind)`.
    async fn is_event_processed(&self, event_id: &EventId, worker_kind: &str) -> Result<bool, PipelineError>;

    /// Conditionally advances an order from `Created` to `PaymentPending`, incrementing its
    /// version. Returns the new version, or `None` if the order was not in `Created` (already
    /// advanced, or absent).
    async fn advance_to_payment_pending(&self, id: &OrderId) -> Result<Option<i64>, PipelineError>;

    /// Commits an order's terminal state in a single transaction:
    /// * conditional update to `state` guarded by `PaymentPending` and `expected_version`;
    /// * one follow-up outbox row;
    /// * the dedup ledger entry for `(source_event, worker_kind)`.
    ///
    /// Returns `false` without writing anything if the guard matched 0 rows: a peer worker won
    /// the race and its commit is authoritative.
    async fn commit_terminal_state(
        &self,
        id: &OrderId,
        expected_version: i64,
        state: OrderState,
        source_event: &EventId,
        worker_kind: &str,
        follow_up: NewOutboxEvent,
    ) -> Result<bool, PipelineError>;

    /// Records a poison event. Idempotent on `event_id`.
    async fn insert_dead_letter(&self, dead_letter: NewDeadLetter) -> Result<(), PipelineError>;

    /// Dead letters, newest first.
    async fn fetch_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRecord>, PipelineError>;
}
