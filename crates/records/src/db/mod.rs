//! SQLite record store: connection pool, schema, and row-level queries.
//!
//! Row functions take `&mut SqliteConnection` so the access layer can run a
//! domain mutation and its audit append inside one transaction.
//!
//! # Store invariants
//!
//! - Protected attributes are only ever written as envelope BLOBs (`*_enc`).
//! - `audit_events` rejects `UPDATE` and `DELETE` at the store level.
//! - `visits.patient_id` has no `ON DELETE CASCADE`; removing a patient's
//!   visits is an explicit step of the access layer.

pub mod audit_events;
pub mod patients;
pub mod visits;

use std::{str::FromStr, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};
use tracing::info;

/// Open a connection pool for `database_url` and bring the schema up to date.
///
/// The database file is created if missing. Foreign keys are enforced and the
/// journal runs in WAL mode so readers do not block the single writer.
///
/// # Errors
///
/// Returns an error if the URL is invalid, the database cannot be opened, or
/// a migration fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    info!(max_connections, "record store ready");
    Ok(pool)
}

/// Apply the embedded `migrations/` (tables, indexes, append-only triggers).
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Begin a transaction that holds the write lock from its first statement.
///
/// Every audited operation appends to `audit_events`. Under WAL a deferred
/// `BEGIN` that reads first fails with `SQLITE_BUSY_SNAPSHOT` if another
/// connection commits before its first write; `BEGIN IMMEDIATE` waits on
/// `busy_timeout` instead.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Returns `true` if the store answers a trivial query.
pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Single-connection in-memory pool with the full schema, for tests.
///
/// Each in-memory SQLite connection is its own database, so the pool is
/// pinned to one connection that never expires.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
