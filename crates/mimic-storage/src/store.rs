//! The capture store.
//!
//! A single-file embedded database holding one bucket of fingerprint →
//! encoded-payload entries. Writes are atomic single-key upserts with
//! last-writer-wins semantics; the engine reaches the store only through
//! the [`Cache`] trait.
//!
//! Every operation is a single-key statement, so a Mutex-protected
//! connection is enough: contention stays short even with many request
//! tasks in flight, and a poisoned lock surfaces as a store failure rather
//! than a panic in the request path.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use mimic_core::{Cache, CacheError};

use crate::error::{Result, StorageError};
use crate::schema::run_migrations;

/// Embedded store for captured exchanges.
#[derive(Clone)]
pub struct CaptureStore {
    conn: Arc<Mutex<Connection>>,
}

impl CaptureStore {
    /// Open (or create) the store in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Open (or create) the store at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening capture store at: {:?}", path);
        Self::open(Connection::open(&path)?)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(Connection::open_in_memory()?)
    }

    fn open(conn: Connection) -> Result<Self> {
        // WAL keeps concurrent readers off the writer's back.
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA cache_size = -2000;")?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "mimic", "mimic")
            .ok_or_else(|| StorageError::Config("could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("captures.db"))
    }

    fn conn(&self) -> std::result::Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Unavailable("store lock poisoned".into()))
    }
}

impl Cache for CaptureStore {
    fn set(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO captures (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, CacheError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM captures WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(unavailable)
    }

    fn len(&self) -> std::result::Result<u64, CacheError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM captures", [], |row| row.get(0))
            .map_err(unavailable)?;
        Ok(count as u64)
    }

    fn clear(&self) -> std::result::Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM captures", [])
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: impl std::fmt::Display) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn get_missing_key_is_none() {
        let store = CaptureStore::in_memory().unwrap();
        assert_eq!(store.get(b"absent").unwrap(), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = CaptureStore::in_memory().unwrap();
        store.set(b"key", b"value").unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn set_is_last_writer_wins() {
        let store = CaptureStore::in_memory().unwrap();
        store.set(b"key", b"first").unwrap();
        store.set(b"key", b"second").unwrap();

        assert_eq!(store.get(b"key").unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn clear_empties_the_bucket() {
        let store = CaptureStore::in_memory().unwrap();
        store.set(b"a", b"1").unwrap();
        store.set(b"b", b"2").unwrap();
        assert_eq!(store.len().unwrap(), 2);

        store.clear().unwrap();
        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn values_survive_reopening_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("captures.db");

        {
            let store = CaptureStore::with_path(&path).unwrap();
            store.set(b"key", b"persisted").unwrap();
        }

        let reopened = CaptureStore::with_path(&path).unwrap();
        assert_eq!(reopened.get(b"key").unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn binary_keys_and_values_are_preserved() {
        let store = CaptureStore::in_memory().unwrap();
        let key = [0u8, 159, 146, 150];
        let value = [255u8, 0, 128, 7];
        store.set(&key, &value).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(value.to_vec()));
    }

    #[test]
    fn clones_share_the_same_bucket() {
        let store = CaptureStore::in_memory().unwrap();
        let other = store.clone();

        store.set(b"key", b"shared").unwrap();
        assert_eq!(other.get(b"key").unwrap(), Some(b"shared".to_vec()));
    }

    #[test]
    fn concurrent_writers_all_complete() {
        let store = CaptureStore::in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        let key = format!("key-{i}-{j}");
                        store.set(key.as_bytes(), b"v").unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len().unwrap(), 200);
    }
}
