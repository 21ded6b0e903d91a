use sqlx::PgPool;
use uuid::Uuid;

/// key: audit-event -> append-only user activity trail
///
/// Append an audit event. Callers on best-effort paths log the error and
/// carry on; the append itself never mutates anything else.
pub async fn record_event(
    pool: &PgPool,
    user_id: Uuid,
    event_type: &str,
    event_data: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO events (user_id, event_type, event_data) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(event_type)
        .bind(event_data)
        .execute(pool)
        .await?;
    Ok(())
}
