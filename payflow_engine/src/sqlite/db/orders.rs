use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderState},
    traits::PipelineError,
};

/// Inserts a new order in state `Created` with `version = 0`. Not atomic on its own; embed the
/// call inside a transaction and pass `&mut *tx` as the connection argument where atomicity with
/// the outbox write is required.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PipelineError> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (id, user_id, amount, state, version)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING *;
        "#,
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.amount)
    .bind(OrderState::Created)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted for user {}", order.id, order.user_id);
    Ok(order)
}

pub async fn fetch_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// The worker's claim: `Created → PaymentPending`, version + 1, guarded on the pre-state. Returns the
/// new version, or `None` when the order is not in `Created`. The loser of a race, a duplicate
/// delivery and an unknown order all land here and exit cleanly.
pub async fn advance_to_payment_pending(
    id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, PipelineError> {
    let row: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET state = $1, version = version + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND state = $3
            RETURNING *;
        "#,
    )
    .bind(OrderState::PaymentPending)
    .bind(id.as_str())
    .bind(OrderState::Created)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(|o| o.version))
}

/// The terminal update: `PaymentPending → Paid|Failed`, guarded on both the pre-state and the
/// version observed at claim time. Returns `None` when the optimistic guard matches 0 rows.
pub async fn settle_order(
    id: &OrderId,
    expected_version: i64,
    state: OrderState,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let row = sqlx::query_as(
        r#"
            UPDATE orders
            SET state = $1, version = version + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND state = $3 AND version = $4
            RETURNING *;
        "#,
    )
    .bind(state)
    .bind(id.as_str())
    .bind(OrderState::PaymentPending)
    .bind(expected_version)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}
