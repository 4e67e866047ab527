//! Database schema migrations.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 1;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);
    if current_version > CURRENT_VERSION {
        warn!(
            found = current_version,
            supported = CURRENT_VERSION,
            "database schema is newer than this build"
        );
    }
    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 for a fresh database.
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: usage ledger, profile, guardians, routine and kv tables.
///
/// Usage events are append-only; the CHECK keeps non-positive durations out
/// even if a caller bypasses the ledger.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS usage_events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            source        TEXT NOT NULL,
            duration_secs INTEGER NOT NULL CHECK (duration_secs > 0),
            recorded_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS profile (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            display_name    TEXT NOT NULL,
            role            TEXT NOT NULL,
            daily_limit_min INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS guardians (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            name  TEXT NOT NULL,
            phone TEXT,
            email TEXT
        );

        CREATE TABLE IF NOT EXISTS routine_items (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            scheduled_time TEXT NOT NULL,
            activity       TEXT NOT NULL,
            completed      INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_usage_events_recorded_at ON usage_events(recorded_at);
        CREATE INDEX IF NOT EXISTS idx_routine_items_time ON routine_items(scheduled_time);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}
