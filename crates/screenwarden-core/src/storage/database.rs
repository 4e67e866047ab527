//! SQLite-based persistence.
//!
//! Provides persistent storage for:
//! - Usage events (append-only, range-queried by timestamp)
//! - The user profile, guardians and routine items
//! - Key-value store for engine state (lockout machine)

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result, ValidationError};
use crate::ledger::{UsageEvent, UsageStore};
use crate::lockout::{LockoutMachine, LockoutStore};
use crate::profile::{Guardian, GuardianStore, Profile, ProfileStore, RoutineItem, RoutineStore};

/// SQLite database shared by every store trait.
///
/// The connection sits behind a mutex so one `Database` can be handed to
/// the engine as `Arc<dyn ...Store>` from several tasks.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/screenwarden/screenwarden.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("screenwarden.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        migrations::migrate(&conn)?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

/// kv key holding the lockout machine as JSON.
pub const LOCKOUT_KEY: &str = "lockout_machine";

impl LockoutStore for Database {
    fn load_lockout(&self) -> Result<Option<LockoutMachine>> {
        let Some(json) = self.kv_get(LOCKOUT_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(machine) => Ok(Some(machine)),
            Err(e) => {
                warn!(error = %e, "stored lockout state is unreadable, starting unlocked");
                Ok(None)
            }
        }
    }

    fn save_lockout(&self, machine: &LockoutMachine) -> Result<()> {
        self.kv_set(LOCKOUT_KEY, &serde_json::to_string(machine)?)
    }
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn corrupt(table: &str, message: impl Into<String>) -> DatabaseError {
    DatabaseError::CorruptRow {
        table: table.to_string(),
        message: message.into(),
    }
}

impl UsageStore for Database {
    fn append(&self, event: &UsageEvent) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO usage_events (source, duration_secs, recorded_at) VALUES (?1, ?2, ?3)",
            params![event.source, event.duration_secs, ts(event.recorded_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, duration_secs, recorded_at
             FROM usage_events
             WHERE recorded_at >= ?1
             ORDER BY recorded_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![ts(since)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (source, duration_secs, recorded_at) = row?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
                .map_err(|e| corrupt("usage_events", e.to_string()))?
                .with_timezone(&Utc);
            events.push(UsageEvent {
                source,
                duration_secs,
                recorded_at,
            });
        }
        Ok(events)
    }
}

impl ProfileStore for Database {
    fn get(&self) -> Result<Profile> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT display_name, role, daily_limit_min FROM profile WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(Profile::default()),
            Some((display_name, role, daily_limit_min)) => Ok(Profile {
                display_name,
                role: role
                    .parse()
                    .map_err(|e: ValidationError| corrupt("profile", e.to_string()))?,
                daily_limit_min,
            }),
        }
    }

    fn put(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;
        self.conn()?.execute(
            "INSERT OR REPLACE INTO profile (id, display_name, role, daily_limit_min)
             VALUES (1, ?1, ?2, ?3)",
            params![
                profile.display_name,
                profile.role.as_str(),
                profile.daily_limit_min
            ],
        )?;
        Ok(())
    }
}

impl GuardianStore for Database {
    fn list(&self) -> Result<Vec<Guardian>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, phone, email FROM guardians ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Guardian {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                phone: row.get(2)?,
                email: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn add(&self, guardian: &Guardian) -> Result<i64> {
        guardian.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO guardians (name, phone, email) VALUES (?1, ?2, ?3)",
            params![guardian.name, guardian.phone, guardian.email],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl RoutineStore for Database {
    fn list(&self) -> Result<Vec<RoutineItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, scheduled_time, activity, completed
             FROM routine_items
             ORDER BY scheduled_time ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, time, activity, completed) = row?;
            let scheduled_time = RoutineItem::parse_time(&time)
                .map_err(|e| corrupt("routine_items", e.to_string()))?;
            items.push(RoutineItem {
                id: Some(id),
                scheduled_time,
                activity,
                completed,
            });
        }
        Ok(items)
    }

    fn add(&self, item: &RoutineItem) -> Result<i64> {
        item.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO routine_items (scheduled_time, activity, completed) VALUES (?1, ?2, ?3)",
            params![
                item.scheduled_time.format("%H:%M").to_string(),
                item.activity,
                item.completed
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn remove(&self, id: i64) -> Result<()> {
        let changed = self
            .conn()?
            .execute("DELETE FROM routine_items WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(ValidationError::NotFound {
                kind: "routine item".into(),
                id,
            }
            .into());
        }
        Ok(())
    }

    fn set_completed(&self, id: i64, completed: bool) -> Result<()> {
        let changed = self.conn()?.execute(
            "UPDATE routine_items SET completed = ?1 WHERE id = ?2",
            params![completed, id],
        )?;
        if changed == 0 {
            return Err(ValidationError::NotFound {
                kind: "routine item".into(),
                id,
            }
            .into());
        }
        Ok(())
    }
}
