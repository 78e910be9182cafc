//! `SqliteDatabase` is a concrete implementation of the pipeline database backend.
use std::fmt::Debug;

use log::debug;
use sqlx::SqlitePool;

use super::db::{dead_letters, db_url, new_pool, orders, outbox, processed_events};
use crate::{
    db_types::{
        DeadLetterRecord, EventId, NewDeadLetter, NewOrder, NewOutboxEvent, Order, OrderId, OrderState, OutboxRecord,
    },
    events::{EventType, OrderCreatedPayload},
    traits::{PipelineDatabase, PipelineError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database named by `PF_DATABASE_URL` (or the default).
    pub async fn new(max_connections: u32) -> Result<Self, PipelineError> {
        Self::new_with_url(&db_url(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, PipelineError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PipelineDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Inserts the order and its `OrderCreated` outbox row in a single atomic transaction. Any
    /// error rolls back both inserts.
    async fn create_order_with_event(&self, order: NewOrder) -> Result<Order, PipelineError> {
        let payload =
            OrderCreatedPayload { order_id: order.id.clone(), user_id: order.user_id.clone(), amount: order.amount };
        let event = NewOutboxEvent::for_order(&order.id, EventType::OrderCreated.to_string(), &payload)?;

        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        let record = outbox::insert_outbox_event(event, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] committed together with event {}", order.id, record.event_id);
        Ok(order)
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_unpublished_events(&self, limit: i64) -> Result<Vec<OutboxRecord>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        outbox::fetch_unpublished(limit, &mut conn).await
    }

    async fn mark_event_published(&self, event_id: &EventId) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        outbox::mark_published(event_id, &mut conn).await
    }

    async fn count_unpublished(&self) -> Result<i64, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        outbox::count_unpublished(&mut conn).await
    }

    async fn is_event_processed(&self, event_id: &EventId, worker_kind: &str) -> Result<bool, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        processed_events::is_processed(event_id, worker_kind, &mut conn).await
    }

    async fn advance_to_payment_pending(&self, id: &OrderId) -> Result<Option<i64>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        orders::advance_to_payment_pending(id, &mut conn).await
    }

    /// The terminal commit: terminal state, follow-up event and dedup entry stand or fall
    /// together. Losing the optimistic guard drops the transaction without writing anything.
    async fn commit_terminal_state(
        &self,
        id: &OrderId,
        expected_version: i64,
        state: OrderState,
        source_event: &EventId,
        worker_kind: &str,
        follow_up: NewOutboxEvent,
    ) -> Result<bool, PipelineError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::settle_order(id, expected_version, state, &mut tx).await? else {
            // a peer worker's commit is authoritative; dropping the tx rolls it back
            return Ok(false);
        };
        outbox::insert_outbox_event(follow_up, &mut tx).await?;
        processed_events::insert_processed(source_event, worker_kind, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] settled as {} (v{})", order.id, order.state, order.version);
        Ok(true)
    }

    async fn insert_dead_letter(&self, dead_letter: NewDeadLetter) -> Result<(), PipelineError> {
        let mut conn = self.pool.acquire().await?;
        dead_letters::insert_dead_letter(dead_letter, &mut conn).await
    }

    async fn fetch_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRecord>, PipelineError> {
        let mut conn = self.pool.acquire().await?;
        dead_letters::fetch_dead_letters(limit, &mut conn).await
    }
}
