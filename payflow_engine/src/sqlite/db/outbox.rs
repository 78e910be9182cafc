use sqlx::SqliteConnection;

use crate::{
    db_types::{EventId, NewOutboxEvent, OutboxRecord},
    traits::PipelineError,
};

/// Inserts a pending outbound event. The `event_id` UNIQUE constraint is the guarantee that an
/// event is recorded at most once.
pub async fn insert_outbox_event(
    event: NewOutboxEvent,
    conn: &mut SqliteConnection,
) -> Result<OutboxRecord, PipelineError> {
    let record = sqlx::query_as(
        r#"
            INSERT INTO outbox (event_id, aggregate_type, aggregate_id, event_type, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(event.event_id)
    .bind(event.aggregate_type)
    .bind(event.aggregate_id)
    .bind(event.event_type)
    .bind(event.payload)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

/// Unpublished rows in creation order, ties broken by the monotonic sequence id.
pub async fn fetch_unpublished(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<OutboxRecord>, PipelineError> {
    let rows = sqlx::query_as(
        "SELECT * FROM outbox WHERE published = 0 ORDER BY created_at ASC, id ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Flips `published` and stamps `published_at`. The `published = 0` predicate keeps the stamp
/// from moving if the relay marks a row twice.
pub async fn mark_published(event_id: &EventId, conn: &mut SqliteConnection) -> Result<(), PipelineError> {
    sqlx::query("UPDATE outbox SET published = 1, published_at = CURRENT_TIMESTAMP WHERE event_id = $1 AND published = 0")
        .bind(event_id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn count_unpublished(conn: &mut SqliteConnection) -> Result<i64, PipelineError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE published = 0").fetch_one(conn).await?;
    Ok(count)
}

pub async fn fetch_for_aggregate(
    aggregate_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<OutboxRecord>, PipelineError> {
    let rows = sqlx::query_as("SELECT * FROM outbox WHERE aggregate_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(aggregate_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
