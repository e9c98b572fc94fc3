//! SQLite cache backend
//!
//! Durable storage sharable across bouncer processes on one host. Deferred
//! saves are staged in memory and committed in a single transaction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::cache::backend::{CacheBackend, CacheItem};
use crate::error::CacheError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

type Result<T> = std::result::Result<T, CacheError>;

/// SQLite-backed cache storage
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    staged: Mutex<HashMap<String, CacheItem>>,
}

impl SqliteBackend {
    /// Open or create storage at the default XDG cache location
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::cache_dir()?)
    }

    /// Get the cache directory path (~/.cache/veto on Linux/macOS)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir()
            .ok_or_else(|| CacheError::Io("could not determine cache directory".to_string()))?;
        Ok(cache_base.join("veto"))
    }

    /// Open storage at a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("decisions.db");
        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            std::fs::remove_file(&db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                expires_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_expires_at ON cache_entries(expires_at);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            staged: Mutex::new(HashMap::new()),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Backend("sqlite connection poisoned".to_string()))
    }

    fn lock_staged(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheItem>>> {
        self.staged
            .lock()
            .map_err(|_| CacheError::Backend("sqlite staging buffer poisoned".to_string()))
    }

    fn write_item(conn: &Connection, item: &CacheItem) -> Result<()> {
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (cache_key, data, tags, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.key,
                serde_json::to_string(&item.value)?,
                serde_json::to_string(&item.tags)?,
                now,
                item.expires_at,
            ],
        )?;
        Ok(())
    }
}

impl CacheBackend for SqliteBackend {
    fn fetch(&self, key: &str) -> Result<Option<CacheItem>> {
        if self.lock_staged()?.contains_key(key) {
            self.commit()?;
        }

        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        let row: Option<(String, String, Option<i64>)> = conn
            .query_row(
                "SELECT data, tags, expires_at FROM cache_entries WHERE cache_key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((_, _, Some(exp))) if now > exp => {
                conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", [key])?;
                Ok(None)
            }
            Some((data, tags, expires_at)) => Ok(Some(CacheItem::new(
                key.to_string(),
                serde_json::from_str(&data)?,
                expires_at,
                serde_json::from_str(&tags)?,
            ))),
            None => Ok(None),
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.fetch(key)?.is_some())
    }

    fn save(&self, item: CacheItem) -> Result<bool> {
        let conn = self.lock_conn()?;
        Self::write_item(&conn, &item)?;
        Ok(true)
    }

    fn save_deferred(&self, item: CacheItem) -> Result<bool> {
        self.lock_staged()?.insert(item.key.clone(), item);
        Ok(true)
    }

    fn commit(&self) -> Result<bool> {
        let staged: Vec<CacheItem> = {
            let mut guard = self.lock_staged()?;
            guard.drain().map(|(_, item)| item).collect()
        };
        if staged.is_empty() {
            return Ok(true);
        }
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        for item in &staged {
            Self::write_item(&tx, item)?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.lock_staged()?.remove(key);
        let conn = self.lock_conn()?;
        let deleted = conn.execute("DELETE FROM cache_entries WHERE cache_key = ?1", [key])?;
        Ok(deleted > 0)
    }

    fn clear(&self) -> Result<bool> {
        self.lock_staged()?.clear();
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM cache_entries", [])?;
        Ok(true)
    }

    fn prune(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let conn = self.lock_conn()?;
        let swept = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at < ?1",
            [now],
        )?;
        Ok(swept)
    }

    fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        let pattern = format!("%\"{}\"%", tag);
        let conn = self.lock_conn()?;
        let dropped = conn.execute("DELETE FROM cache_entries WHERE tags LIKE ?1", [pattern])?;
        Ok(dropped)
    }
}
