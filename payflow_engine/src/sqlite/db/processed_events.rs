use sqlx::SqliteConnection;

use crate::{
    db_types::{EventId, ProcessedEvent},
    traits::PipelineError,
};

pub async fn is_processed(
    event_id: &EventId,
    worker_kind: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, PipelineError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM processed_events WHERE event_id = $1 AND worker_kind = $2")
            .bind(event_id.as_str())
            .bind(worker_kind)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

pub async fn fetch_processed(
    event_id: &EventId,
    worker_kind: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ProcessedEvent>, PipelineError> {
    let row = sqlx::query_as("SELECT * FROM processed_events WHERE event_id = $1 AND worker_kind = $2")
        .bind(event_id.as_str())
        .bind(worker_kind)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Records the commit point for `(event_id, worker_kind)`. A no-op if the entry already exists;
/// the primary key is the serialization point between racing workers.
pub async fn insert_processed(
    event_id: &EventId,
    worker_kind: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PipelineError> {
    sqlx::query(
        "INSERT INTO processed_events (event_id, worker_kind) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(event_id.as_str())
    .bind(worker_kind)
    .execute(conn)
    .await?;
    Ok(())
}
