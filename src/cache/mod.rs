//! Scoped decision cache
//!
//! Persists decisions in a pluggable key-value backend with per-entry TTL,
//! deferred/batched writes, tag-based bulk invalidation, and an IPv4 bucket
//! index for range containment lookups.

use serde::{Deserialize, Serialize};

use crate::decision::ID_SEP;

pub mod backend;
pub mod key;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use backend::{CacheBackend, CacheItem};
pub use key::KeyPrefix;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use store::{CacheMutation, CacheStore};

/// Addresses covered by one IPv4 range bucket (one bucket spans a /24)
pub const IPV4_BUCKET_SIZE: u64 = 256;

/// Cache key of the persisted origin counters
pub const ORIGINS_COUNT_KEY: &str = "origins_count";

/// Tag carried by every decision entry
pub const TAG_REMEDIATION: &str = "remediation";
/// Tag carried by bucket index entries
pub const TAG_RANGE_BUCKET: &str = "range_bucket";
/// Tag carried by cached geolocation variables
pub const TAG_GEOLOCATION: &str = "geolocation";

/// Stored form of a decision, minimized for cache space.
///
/// Serializes as a `[main_value, expires_at, identifier]` JSON array. The main
/// value is the remediation name for exact-scope entries and the range literal
/// for bucket index entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDecision(String, i64, String);

impl CachedDecision {
    pub fn new(main: String, expires_at: i64, identifier: String) -> Self {
        Self(main, expires_at, identifier)
    }

    /// Remediation name, or the range literal for bucket entries
    pub fn main(&self) -> &str {
        &self.0
    }

    /// Absolute Unix expiration of the underlying decision
    pub fn expires_at(&self) -> i64 {
        self.1
    }

    /// De-duplication identifier of the underlying decision
    pub fn identifier(&self) -> &str {
        &self.2
    }

    /// Normalized origin, recovered from the identifier's first segment
    pub fn origin(&self) -> &str {
        self.2.split(ID_SEP).next().unwrap_or("")
    }
}
