//! Ingress write protocol.
use std::fmt::Debug;

use log::info;

use crate::{
    db_types::{DeadLetterRecord, NewOrder, Order, OrderId},
    traits::{PipelineDatabase, PipelineError},
};

/// `OrderFlowApi` is the primary API for accepting orders into the pipeline and reading back
/// their progress.
pub struct OrderFlowApi<B> {
    db: B,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrderFlowApi<B>
where B: PipelineDatabase
{
    /// Durably records a new order and its `OrderCreated` event in one transaction. The event is
    /// durable before it ever touches the broker; the relay picks it up from the outbox.
    ///
    /// Every call creates a distinct order, even for identical inputs. There is no request-id
    /// dedup at this layer.
    pub async fn submit_order(&self, order: NewOrder) -> Result<Order, PipelineError> {
        let order = self.db.create_order_with_event(order).await?;
        info!("🧾️ Order [{}] accepted for user {} ({})", order.id, order.user_id, order.amount);
        Ok(order)
    }

    pub async fn order_status(&self, id: &OrderId) -> Result<Option<Order>, PipelineError> {
        self.db.fetch_order(id).await
    }

    /// Poison events recorded by the workers, newest first.
    pub async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadLetterRecord>, PipelineError> {
        self.db.fetch_dead_letters(limit).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
