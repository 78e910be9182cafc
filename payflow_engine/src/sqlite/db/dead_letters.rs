use sqlx::SqliteConnection;

use crate::{
    db_types::{DeadLetterRecord, NewDeadLetter},
    traits::PipelineError,
};

/// Records a poison event. Idempotent on `event_id`: a redelivered poison message must not
/// produce a second row.
pub async fn insert_dead_letter(
    dead_letter: NewDeadLetter,
    conn: &mut SqliteConnection,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
            INSERT INTO dead_letter_events (event_id, event_type, aggregate_id, payload, reason)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING;
        "#,
    )
    .bind(dead_letter.event_id)
    .bind(dead_letter.event_type)
    .bind(dead_letter.aggregate_id)
    .bind(dead_letter.payload)
    .bind(dead_letter.reason)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_dead_letters(
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<DeadLetterRecord>, PipelineError> {
    let rows = sqlx::query_as("SELECT * FROM dead_letter_events ORDER BY failed_at DESC LIMIT $1")
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
