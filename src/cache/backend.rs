//! Pluggable key-value backend contract
//!
//! Backends persist opaque JSON values under opaque keys with an optional
//! expiration and a set of tags. Deferred saves are staged in memory and made
//! durable by `commit`; reads of a key with a staged write flush the staging
//! buffer first, so a read-modify-write batch observes its own writes.

use serde_json::Value;

use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// One backend item: key, JSON payload, optional expiry, tags
#[derive(Debug, Clone, PartialEq)]
pub struct CacheItem {
    /// Encoded cache key
    pub key: String,

    /// JSON payload (a tuple list for decision entries, a map otherwise)
    pub value: Value,

    /// Absolute Unix expiration, `None` for entries that never expire
    pub expires_at: Option<i64>,

    /// Tags for bulk invalidation
    pub tags: Vec<String>,
}

impl CacheItem {
    pub fn new(key: String, value: Value, expires_at: Option<i64>, tags: Vec<String>) -> Self {
        Self {
            key,
            value,
            expires_at,
            tags,
        }
    }

    /// Whether the item is expired at `now` (strictly past its expiry)
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if now > exp)
    }
}

/// Key-value persistence used by the cache store.
///
/// Implementations must treat expired items as misses. `prune` and
/// `invalidate_tag` are optional capabilities; backends that cannot support
/// them keep the default implementations, and callers get a distinct
/// `CacheError::Unsupported` instead of silent no-ops.
pub trait CacheBackend: Send + Sync {
    /// Fetch a live item, lazily discarding it if expired
    fn fetch(&self, key: &str) -> Result<Option<CacheItem>>;

    /// Whether a live item exists for the key
    fn contains(&self, key: &str) -> Result<bool>;

    /// Persist an item immediately
    fn save(&self, item: CacheItem) -> Result<bool>;

    /// Stage an item for a later `commit`
    fn save_deferred(&self, item: CacheItem) -> Result<bool>;

    /// Make all staged items durable and visible to reads
    fn commit(&self) -> Result<bool>;

    /// Delete an item outright; returns whether something was deleted
    fn delete(&self, key: &str) -> Result<bool>;

    /// Drop every item, staged writes included
    fn clear(&self) -> Result<bool>;

    /// Actively delete expired items, returning how many were swept
    fn prune(&self) -> Result<usize> {
        Err(CacheError::Unsupported("prune"))
    }

    /// Delete every item carrying the tag, returning how many were dropped
    fn invalidate_tag(&self, _tag: &str) -> Result<usize> {
        Err(CacheError::Unsupported("invalidate_tag"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend keeping the default capability implementations
    struct BareBackend;

    impl CacheBackend for BareBackend {
        fn fetch(&self, _key: &str) -> Result<Option<CacheItem>> {
            Ok(None)
        }

        fn contains(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }

        fn save(&self, _item: CacheItem) -> Result<bool> {
            Ok(true)
        }

        fn save_deferred(&self, _item: CacheItem) -> Result<bool> {
            Ok(true)
        }

        fn commit(&self) -> Result<bool> {
            Ok(true)
        }

        fn delete(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }

        fn clear(&self) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_item_without_expiry_never_expires() {
        let item = CacheItem::new("k".into(), Value::Null, None, vec![]);
        assert!(!item.is_expired(i64::MAX));
    }

    #[test]
    fn test_item_expiry_is_strict() {
        let item = CacheItem::new("k".into(), Value::Null, Some(100), vec![]);
        assert!(!item.is_expired(100));
        assert!(item.is_expired(101));
    }

    #[test]
    fn test_missing_capabilities_surface_as_errors() {
        let backend = BareBackend;
        match backend.prune() {
            Err(CacheError::Unsupported("prune")) => (),
            other => panic!("Expected Unsupported(prune), got {:?}", other),
        }
        match backend.invalidate_tag("remediation") {
            Err(CacheError::Unsupported("invalidate_tag")) => (),
            other => panic!("Expected Unsupported(invalidate_tag), got {:?}", other),
        }
    }
}
