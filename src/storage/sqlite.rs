//! SQLite cache backend

use super::traits::{ArtifactCache, OpenCache, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed artifact cache
///
/// One table keyed by `(stage, config_hash)`. Thread-safe via internal
/// mutex on the connection.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                stage TEXT NOT NULL,
                config_hash TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (stage, config_hash)
            );

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    /// Create an in-memory cache (useful for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// When the entry for a key was written.
    pub fn created_at(&self, stage: &str, fingerprint: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT created_at FROM artifacts WHERE stage = ?1 AND config_hash = ?2",
                params![stage, fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StorageError::DateParse(e.to_string()))
        })
        .transpose()
    }

    /// Number of cached entries for a stage, across all fingerprints
    pub fn count(&self, stage: &str) -> StorageResult<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE stage = ?1",
            params![stage],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl OpenCache for SqliteCache {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ArtifactCache for SqliteCache {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self, stage: &str, fingerprint: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM artifacts WHERE stage = ?1 AND config_hash = ?2",
                params![stage, fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn store(&self, stage: &str, fingerprint: &str, payload: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO artifacts (stage, config_hash, payload, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(stage, config_hash) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at
            "#,
            params![stage, fingerprint, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn invalidate(&self, stage: &str, fingerprint: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM artifacts WHERE stage = ?1 AND config_hash = ?2",
            params![stage, fingerprint],
        )?;
        Ok(removed > 0)
    }
}
