//! SQLite backend: embedded database holding one row per key.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use tracing::warn;

use crate::cache::current_timestamp_ms;
use crate::error::{CacheError, Result};
use crate::persistence::PersistenceBackend;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    record TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

/// Embedded database record store.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (creating if needed) a database file and its parent directory,
    /// then applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Persistence("sqlite connection lock poisoned".to_string()))
    }
}

impl PersistenceBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load_all(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, record FROM cache_entries")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let record: rusqlite::Result<String> = row.get(1);
            Ok((key, record))
        })?;

        let mut bodies = Vec::new();
        for row in rows {
            match row {
                Ok((_, Ok(body))) => bodies.push(body),
                Ok((key, Err(e))) => warn!("Skipping unreadable record for key '{}': {}", key, e),
                Err(e) => warn!("Skipping unreadable row: {}", e),
            }
        }
        Ok(bodies)
    }

    fn save(&self, key: &str, body: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO cache_entries (key, record, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                record = excluded.record,
                updated_at = excluded.updated_at",
            params![key, body, current_timestamp_ms() as i64],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.conn()?.execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_dir;

    #[test]
    fn test_sqlite_backend_crud() {
        let backend = SqliteBackend::open_in_memory().unwrap();

        backend.save("a", "1").unwrap();
        backend.save("b", "2").unwrap();
        backend.save("a", "3").unwrap();

        let mut bodies = backend.load_all().unwrap();
        bodies.sort();
        assert_eq!(bodies, vec!["2", "3"]);

        backend.remove("a").unwrap();
        backend.remove("a").unwrap();
        assert_eq!(backend.load_all().unwrap(), vec!["2"]);

        backend.clear().unwrap();
        assert!(backend.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_backend_survives_reopen() {
        let dir = test_dir("sqlite-reopen");
        let path = dir.join("cache.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.save("k", "body").unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.load_all().unwrap(), vec!["body"]);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_sqlite_backend_creates_nested_parent() {
        let dir = test_dir("sqlite-nested");
        let path = dir.join("a").join("b").join("cache.db");
        assert!(!dir.exists());

        let backend = SqliteBackend::open(&path).unwrap();
        backend.save("k", "body").unwrap();
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_sqlite_backend_skips_non_text_record() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.save("good", "body").unwrap();
        backend
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO cache_entries (key, record, updated_at) VALUES ('bad', ?1, 0)",
                params![vec![0xffu8, 0xfe]],
            )
            .unwrap();

        assert_eq!(backend.load_all().unwrap(), vec!["body"]);
    }
}
