//! Durable key-value store backed by SQLite.
//!
//! One database holds both the record collections (`app_data`,
//! `sync_queue`) and the cache partition entries. The schema is brought
//! up to date by an explicit migration table keyed on `PRAGMA
//! user_version`; opening at or above the latest version is a no-op.

pub mod records;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

struct Migration {
  to: i64,
  sql: &'static str,
}

/// Ordered schema steps. Each entry is applied transactionally and bumps
/// `user_version` to `to`; a database already at `to` or beyond skips it.
const MIGRATIONS: &[Migration] = &[
  Migration {
    to: 1,
    sql: r#"
CREATE TABLE IF NOT EXISTS app_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data BLOB NOT NULL,
    created_at TEXT NOT NULL
);
"#,
  },
  Migration {
    to: 2,
    sql: r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (partition, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_partition
    ON cache_entries(partition);
"#,
  },
];

/// Handle to the shared database. Cheap to share behind an `Arc`; the
/// connection is serialized by a mutex with short critical sections.
pub struct Store {
  conn: Mutex<Connection>,
}

impl Store {
  /// Open or create the database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::StorageUnavailable(format!("failed to create data directory: {e}")))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::StorageUnavailable(format!("failed to open database at {}: {e}", path.display()))
    })?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.migrate()?;

    Ok(store)
  }

  /// In-memory database for tests and throwaway runs.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| Error::StorageUnavailable(format!("failed to open in-memory database: {e}")))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.migrate()?;

    Ok(store)
  }

  /// Default database path under the platform data directory.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::StorageUnavailable("could not determine data directory".to_string()))?;

    Ok(data_dir.join("outbox").join("outbox.db"))
  }

  /// Apply every migration newer than the database's current version.
  fn migrate(&self) -> Result<()> {
    let mut conn = self.conn()?;

    let current: i64 = conn
      .pragma_query_value(None, "user_version", |row| row.get(0))
      .map_err(|e| Error::StorageUnavailable(format!("failed to read schema version: {e}")))?;

    for migration in MIGRATIONS.iter().filter(|m| m.to > current) {
      let tx = conn
        .transaction()
        .map_err(|e| Error::StorageUnavailable(format!("failed to begin migration: {e}")))?;

      tx.execute_batch(migration.sql)
        .map_err(|e| Error::StorageUnavailable(format!("migration to v{} failed: {e}", migration.to)))?;
      tx.pragma_update(None, "user_version", migration.to)
        .map_err(|e| Error::StorageUnavailable(format!("migration to v{} failed: {e}", migration.to)))?;

      tx.commit()
        .map_err(|e| Error::StorageUnavailable(format!("migration to v{} failed: {e}", migration.to)))?;

      tracing::debug!(version = migration.to, "applied schema migration");
    }

    Ok(())
  }

  pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::StorageUnavailable(format!("lock poisoned: {e}")))
  }
}
