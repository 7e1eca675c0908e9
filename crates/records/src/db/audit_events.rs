//! Append-only `audit_events` table.
//!
//! There is deliberately no update or delete function here; the store's
//! triggers reject both.

use sqlx::SqliteConnection;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEventRow {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub metadata: String,
    pub timestamp: String,
    pub prev_hash: String,
    pub hash: String,
}

/// Column values for a new event, hash already computed.
#[derive(Debug)]
pub struct NewAuditEvent<'a> {
    pub actor_id: Option<i64>,
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<&'a str>,
    pub metadata: &'a str,
    pub timestamp: &'a str,
    pub prev_hash: &'a str,
    pub hash: &'a str,
}

/// Timestamp and hash of the most recently appended event.
#[derive(Debug, sqlx::FromRow)]
pub struct ChainTip {
    pub timestamp: String,
    pub hash: String,
}

pub async fn tip(conn: &mut SqliteConnection) -> Result<Option<ChainTip>, sqlx::Error> {
    sqlx::query_as::<_, ChainTip>(
        "SELECT timestamp, hash FROM audit_events ORDER BY id DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await
}

pub async fn insert(
    conn: &mut SqliteConnection,
    event: &NewAuditEvent<'_>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO audit_events (
            actor_id, action, resource_type, resource_id,
            metadata, timestamp, prev_hash, hash
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.actor_id)
    .bind(event.action)
    .bind(event.resource_type)
    .bind(event.resource_id)
    .bind(event.metadata)
    .bind(event.timestamp)
    .bind(event.prev_hash)
    .bind(event.hash)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// The `limit` most recent events, newest first; ties on timestamp fall back
/// to insertion order.
pub async fn recent(
    conn: &mut SqliteConnection,
    limit: i64,
) -> Result<Vec<AuditEventRow>, sqlx::Error> {
    sqlx::query_as::<_, AuditEventRow>(
        "SELECT id, actor_id, action, resource_type, resource_id,
                metadata, timestamp, prev_hash, hash
         FROM audit_events
         ORDER BY timestamp DESC, id DESC
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
}

/// Every event in insertion order, for chain verification.
pub async fn all_in_sequence(
    conn: &mut SqliteConnection,
) -> Result<Vec<AuditEventRow>, sqlx::Error> {
    sqlx::query_as::<_, AuditEventRow>(
        "SELECT id, actor_id, action, resource_type, resource_id,
                metadata, timestamp, prev_hash, hash
         FROM audit_events ORDER BY id ASC",
    )
    .fetch_all(&mut *conn)
    .await
}

#[cfg(test)]
pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_events")
        .fetch_one(&mut *conn)
        .await?;
    Ok(n)
}
