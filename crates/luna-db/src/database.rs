use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use luna_common::{Error, Result};
use rusqlite::{Connection, params};
use tracing::info;

use crate::migrations::MIGRATIONS;

/// Single SQLite store holding every Luna entity.
///
/// All access goes through one connection behind a mutex, so a
/// check-then-insert inside [`Database::transaction`] cannot interleave with
/// another request.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.connection()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::Database(format!("failed to create migrations table: {e}")))?;

        let current: u32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
                row.get(0)
            })
            .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn
                .transaction()
                .map_err(|e| Error::Database(format!("failed to begin migration: {e}")))?;
            tx.execute_batch(migration.sql).map_err(|e| {
                Error::Database(format!("migration {} failed: {e}", migration.name))
            })?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)",
                params![migration.version, migration.name, now_str()],
            )
            .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
            tx.commit()
                .map_err(|e| Error::Database(format!("failed to commit migration: {e}")))?;
            info!(
                "applied migration {} ({})",
                migration.version, migration.name
            );
        }

        Ok(())
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))?;
        Ok(value)
    }

    /// Latest applied schema version.
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.connection()?;
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that string
/// comparison in SQL matches chronological order.
pub(crate) fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_str() -> String {
    ts(Utc::now())
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(Error::Database(format!("invalid timestamp format: {raw}")))
}

/// Convert a domain error raised while decoding a row into a rusqlite error.
pub(crate) fn conversion_error(e: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(e.to_string())))
}

pub(crate) fn timestamp_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).map_err(conversion_error)
}

pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(conversion_error)
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Database(format!("failed to serialize column: {e}")))
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::{Database, parse_timestamp, ts};
    use chrono::{Duration, Utc};

    #[test]
    fn in_memory_applies_all_migrations() {
        let db = Database::in_memory().expect("failed to create in-memory database");
        assert_eq!(
            db.schema_version().unwrap(),
            crate::migrations::MIGRATIONS.len() as u32
        );

        let conn = db.connection().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('users', 'subscriptions', 'companions', 'conversations', 'messages',
                  'memories', 'teams', 'team_members', 'workspaces', 'tools', 'voice_usage')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 11);
    }

    #[test]
    fn reopening_a_file_does_not_reapply_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("luna.db");

        let first = Database::open(&path).expect("first open");
        drop(first);
        let second = Database::open(&path).expect("second open");
        assert_eq!(second.schema_version().unwrap(), 1);
    }

    #[test]
    fn stored_timestamps_sort_chronologically() {
        let earlier = Utc::now();
        let later = earlier + Duration::milliseconds(1500);
        assert!(ts(earlier) < ts(later));
        assert_eq!(
            parse_timestamp(&ts(earlier)).unwrap().timestamp_micros(),
            earlier.timestamp_micros()
        );
    }
}
