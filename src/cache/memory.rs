//! In-memory cache backend
//!
//! HashMap-backed storage with a staging buffer for deferred saves. Suited to
//! tests and single-process deployments; state dies with the process.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::cache::backend::{CacheBackend, CacheItem};
use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// In-memory backend with deferred-save support, tags and pruning
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, CacheItem>>,
    staged: Mutex<HashMap<String, CacheItem>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheItem>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("memory store poisoned".to_string()))
    }

    fn lock_staged(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheItem>>> {
        self.staged
            .lock()
            .map_err(|_| CacheError::Backend("memory staging buffer poisoned".to_string()))
    }

    fn flush_staged(&self) -> Result<()> {
        let staged: Vec<CacheItem> = {
            let mut guard = self.lock_staged()?;
            guard.drain().map(|(_, item)| item).collect()
        };
        let mut entries = self.lock_entries()?;
        for item in staged {
            entries.insert(item.key.clone(), item);
        }
        Ok(())
    }
}

impl CacheBackend for MemoryBackend {
    fn fetch(&self, key: &str) -> Result<Option<CacheItem>> {
        if self.lock_staged()?.contains_key(key) {
            self.flush_staged()?;
        }
        let now = Utc::now().timestamp();
        let mut entries = self.lock_entries()?;
        let expired = matches!(entries.get(key), Some(item) if item.is_expired(now));
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.fetch(key)?.is_some())
    }

    fn save(&self, item: CacheItem) -> Result<bool> {
        self.lock_entries()?.insert(item.key.clone(), item);
        Ok(true)
    }

    fn save_deferred(&self, item: CacheItem) -> Result<bool> {
        self.lock_staged()?.insert(item.key.clone(), item);
        Ok(true)
    }

    fn commit(&self) -> Result<bool> {
        self.flush_staged()?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.lock_staged()?.remove(key);
        Ok(self.lock_entries()?.remove(key).is_some())
    }

    fn clear(&self) -> Result<bool> {
        self.lock_staged()?.clear();
        self.lock_entries()?.clear();
        Ok(true)
    }

    fn prune(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut entries = self.lock_entries()?;
        let before = entries.len();
        entries.retain(|_, item| !item.is_expired(now));
        Ok(before - entries.len())
    }

    fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        let mut entries = self.lock_entries()?;
        let before = entries.len();
        entries.retain(|_, item| !item.tags.iter().any(|t| t == tag));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(key: &str, expires_at: Option<i64>, tags: &[&str]) -> CacheItem {
        CacheItem::new(
            key.to_string(),
            json!(["payload"]),
            expires_at,
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    #[test]
    fn test_save_fetch_roundtrip() {
        let backend = MemoryBackend::new();
        backend.save(item("k1", None, &[])).unwrap();

        let fetched = backend.fetch("k1").unwrap().unwrap();
        assert_eq!(fetched.value, json!(["payload"]));
    }

    #[test]
    fn test_deferred_save_invisible_until_commit() {
        let backend = MemoryBackend::new();
        backend.save_deferred(item("k1", None, &[])).unwrap();

        // A different key sees nothing staged
        assert!(backend.fetch("other").unwrap().is_none());

        backend.commit().unwrap();
        assert!(backend.fetch("k1").unwrap().is_some());
    }

    #[test]
    fn test_fetch_of_staged_key_flushes() {
        let backend = MemoryBackend::new();
        backend.save_deferred(item("k1", None, &[])).unwrap();

        // Reading the staged key itself flushes the buffer first
        assert!(backend.fetch("k1").unwrap().is_some());
        assert!(backend.contains("k1").unwrap());
    }

    #[test]
    fn test_expired_item_is_miss_and_removed() {
        let backend = MemoryBackend::new();
        let past = Utc::now().timestamp() - 10;
        backend.save(item("k1", Some(past), &[])).unwrap();

        assert!(backend.fetch("k1").unwrap().is_none());
        assert!(backend.lock_entries().unwrap().get("k1").is_none());
    }

    #[test]
    fn test_delete_missing_is_false() {
        let backend = MemoryBackend::new();
        assert!(!backend.delete("nope").unwrap());
    }

    #[test]
    fn test_prune_sweeps_only_expired() {
        let backend = MemoryBackend::new();
        let now = Utc::now().timestamp();
        backend.save(item("old", Some(now - 5), &[])).unwrap();
        backend.save(item("live", Some(now + 500), &[])).unwrap();
        backend.save(item("eternal", None, &[])).unwrap();

        assert_eq!(backend.prune().unwrap(), 1);
        assert!(backend.fetch("live").unwrap().is_some());
        assert!(backend.fetch("eternal").unwrap().is_some());
    }

    #[test]
    fn test_invalidate_tag() {
        let backend = MemoryBackend::new();
        backend.save(item("a", None, &["remediation", "ip"])).unwrap();
        backend.save(item("b", None, &["range_bucket"])).unwrap();
        backend.save(item("c", None, &["remediation", "range"])).unwrap();

        assert_eq!(backend.invalidate_tag("remediation").unwrap(), 2);
        assert!(backend.fetch("a").unwrap().is_none());
        assert!(backend.fetch("b").unwrap().is_some());
    }

    #[test]
    fn test_clear_drops_staged_too() {
        let backend = MemoryBackend::new();
        backend.save(item("a", None, &[])).unwrap();
        backend.save_deferred(item("b", None, &[])).unwrap();

        backend.clear().unwrap();
        backend.commit().unwrap();
        assert!(backend.fetch("a").unwrap().is_none());
        assert!(backend.fetch("b").unwrap().is_none());
    }
}
