//! The scoped cache store
//!
//! Dispatches decision writes by scope, maintains the IPv4 bucket index for
//! range decisions, and answers containment lookups without scanning every
//! cached range. Writes are staged through the backend's deferred-save path;
//! callers commit once per batch.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use ipnet::{IpNet, Ipv4Net};
use serde_json::Value;

use crate::cache::backend::{CacheBackend, CacheItem};
use crate::cache::key::{self, KeyPrefix};
use crate::cache::{CachedDecision, IPV4_BUCKET_SIZE, TAG_RANGE_BUCKET, TAG_REMEDIATION};
use crate::decision::{Decision, Scope};
use crate::error::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// Outcome of one store or remove call.
///
/// `done` counts writes already durable (immediate deletions), `deferred`
/// counts staged writes awaiting `commit`, and `tuple` is the tuple written
/// or removed. A `None` tuple means the call was a no-op (duplicate, absent,
/// or rejected decision).
#[derive(Debug, Clone, Default)]
pub struct CacheMutation {
    pub done: usize,
    pub deferred: usize,
    pub tuple: Option<CachedDecision>,
}

/// Scoped decision cache over a pluggable backend
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    keys: Mutex<HashMap<(KeyPrefix, String), String>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Sanitized cache key for a prefix and value, memoized per store instance
    pub fn cache_key(&self, prefix: KeyPrefix, value: &str) -> String {
        if let Ok(mut keys) = self.keys.lock() {
            return keys
                .entry((prefix, value.to_string()))
                .or_insert_with(|| key::build(prefix, value))
                .clone();
        }
        key::build(prefix, value)
    }

    /// Store a decision under its scope, plus the bucket index for ranges.
    ///
    /// Range decisions are written into every bucket their span touches and
    /// once under their canonical range key; the canonical result is returned.
    /// Unparseable and IPv6 ranges are logged and skipped.
    pub fn store_decision(&self, decision: &Decision) -> Result<CacheMutation> {
        match decision.scope {
            Scope::Range => self.handle_range_scoped(decision, Self::store),
            _ => self.store(decision, None),
        }
    }

    /// Remove a decision by identifier; removing an absent decision is a no-op
    pub fn remove_decision(&self, decision: &Decision) -> Result<CacheMutation> {
        match decision.scope {
            Scope::Range => self.handle_range_scoped(decision, Self::remove),
            _ => self.remove(decision, None),
        }
    }

    /// All cached tuples covering an IP for the given scope.
    ///
    /// For the range scope the bucket is a coarse filter: each range literal
    /// found there is re-checked for actual containment before its canonical
    /// entry is trusted, since one bucket can hold several disjoint ranges.
    pub fn retrieve_decisions_for_ip(&self, scope: Scope, ip: &str) -> Result<Vec<CachedDecision>> {
        match scope {
            Scope::Ip => self.entry_tuples(&self.cache_key(KeyPrefix::Ip, ip)),
            Scope::Range => {
                let addr: Ipv4Addr = ip
                    .parse()
                    .map_err(|_| CacheError::InvalidIpv4(ip.to_string()))?;
                let bucket_key =
                    self.cache_key(KeyPrefix::Ipv4Bucket, &bucket_int(addr).to_string());
                let mut merged = Vec::new();
                for cached in self.entry_tuples(&bucket_key)? {
                    let range_literal = cached.main();
                    let Ok(range) = range_literal.parse::<Ipv4Net>() else {
                        continue;
                    };
                    if range.contains(&addr) {
                        let range_key = self.cache_key(KeyPrefix::Range, range_literal);
                        merged.extend(self.entry_tuples(&range_key)?);
                    }
                }
                Ok(merged)
            }
            Scope::Country => {
                log::warn!("Country scope is not served by the IP lookup path");
                Ok(Vec::new())
            }
        }
    }

    /// All cached tuples for a country code
    pub fn retrieve_decisions_for_country(&self, country: &str) -> Result<Vec<CachedDecision>> {
        self.entry_tuples(&self.cache_key(KeyPrefix::Country, country))
    }

    /// Drop tuples whose expiration has strictly passed
    pub fn clean_cached_values(values: Vec<CachedDecision>) -> Vec<CachedDecision> {
        let now = Utc::now().timestamp();
        values.into_iter().filter(|v| now <= v.expires_at()).collect()
    }

    /// Flush all staged writes to the backend
    pub fn commit(&self) -> Result<bool> {
        self.backend.commit()
    }

    /// Actively sweep expired entries; backends without the capability error
    pub fn prune(&self) -> Result<usize> {
        self.backend.prune()
    }

    /// Delete every entry carrying the tag
    pub fn invalidate_by_tag(&self, tag: &str) -> Result<usize> {
        self.backend.invalidate_tag(tag)
    }

    /// Drop every cache entry
    pub fn clear(&self) -> Result<bool> {
        self.backend.clear()
    }

    /// Raw JSON value stored under a sanitized cache key
    pub fn get_item(&self, cache_key: &str) -> Result<Option<Value>> {
        Ok(self.backend.fetch(&key::encode(cache_key))?.map(|i| i.value))
    }

    /// Merge key/value pairs into a map-valued entry, saving immediately
    pub fn upsert_item(
        &self,
        cache_key: &str,
        pairs: Vec<(String, Value)>,
        expires_at: Option<i64>,
        tags: &[&str],
    ) -> Result<()> {
        let mut map = match self.get_item(cache_key)? {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        for (name, value) in pairs {
            map.insert(name, value);
        }
        let item = CacheItem::new(
            key::encode(cache_key),
            Value::Object(map),
            expires_at,
            tags.iter().map(|t| t.to_string()).collect(),
        );
        self.backend.save(item)?;
        Ok(())
    }

    /// Cached per-IP variables under a prefix; absent names map to `None`
    pub fn get_ip_variables(
        &self,
        prefix: KeyPrefix,
        names: &[&str],
        ip: &str,
    ) -> Result<HashMap<String, Option<Value>>> {
        let cached = match self.get_item(&self.cache_key(prefix, ip))? {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        Ok(names
            .iter()
            .map(|name| (name.to_string(), cached.get(*name).cloned()))
            .collect())
    }

    /// Merge per-IP variables under a prefix with a TTL and a tag
    pub fn set_ip_variables(
        &self,
        prefix: KeyPrefix,
        pairs: Vec<(String, Value)>,
        ip: &str,
        duration: i64,
        tag: &str,
    ) -> Result<()> {
        let cache_key = self.cache_key(prefix, ip);
        let expires_at = Utc::now().timestamp() + duration;
        self.upsert_item(&cache_key, pairs, Some(expires_at), &[tag])
    }

    fn entry_tuples(&self, cache_key: &str) -> Result<Vec<CachedDecision>> {
        match self.backend.fetch(&key::encode(cache_key))? {
            Some(item) => Ok(serde_json::from_value(item.value)?),
            None => Ok(Vec::new()),
        }
    }

    fn handle_range_scoped(
        &self,
        decision: &Decision,
        op: fn(&Self, &Decision, Option<u64>) -> Result<CacheMutation>,
    ) -> Result<CacheMutation> {
        let Some(range) = self.manage_range(decision) else {
            return Ok(CacheMutation::default());
        };
        let start = bucket_int(range.network());
        let end = bucket_int(range.broadcast());
        for bucket in start..=end {
            op(self, decision, Some(bucket))?;
        }
        op(self, decision, None)
    }

    fn manage_range(&self, decision: &Decision) -> Option<Ipv4Net> {
        match decision.value.parse::<IpNet>() {
            Ok(IpNet::V4(range)) => Some(range),
            Ok(IpNet::V6(_)) => {
                log::warn!(
                    "IPv6 range bucketing is not implemented, skipping decision {}",
                    decision.identifier
                );
                None
            }
            Err(_) => {
                log::error!(
                    "Invalid range {:?} in decision {}",
                    decision.value,
                    decision.identifier
                );
                None
            }
        }
    }

    fn store(&self, decision: &Decision, bucket: Option<u64>) -> Result<CacheMutation> {
        let cache_key = self.entry_key(decision, bucket);
        let cached = self.entry_tuples(&cache_key)?;
        if cached
            .iter()
            .any(|c| c.identifier() == decision.identifier)
        {
            return Ok(CacheMutation::default());
        }
        let mut to_cache = Self::clean_cached_values(cached);
        let tuple = format_decision(decision, bucket.is_some());
        to_cache.push(tuple.clone());

        let item = self.build_entry(&cache_key, &to_cache, entry_tags(decision, bucket.is_some()))?;
        if !self.backend.save_deferred(item)? {
            log::warn!("Deferred save failed for decision {}", decision.identifier);
            return Ok(CacheMutation::default());
        }
        Ok(CacheMutation {
            done: 0,
            deferred: 1,
            tuple: Some(tuple),
        })
    }

    fn remove(&self, decision: &Decision, bucket: Option<u64>) -> Result<CacheMutation> {
        let cache_key = self.entry_key(decision, bucket);
        let mut cached = self.entry_tuples(&cache_key)?;
        let Some(index) = cached
            .iter()
            .position(|c| c.identifier() == decision.identifier)
        else {
            return Ok(CacheMutation::default());
        };
        let removed = cached.remove(index);
        let remaining = Self::clean_cached_values(cached);
        if remaining.is_empty() {
            let deleted = self.backend.delete(&key::encode(&cache_key))?;
            return Ok(CacheMutation {
                done: usize::from(deleted),
                deferred: 0,
                tuple: Some(removed),
            });
        }

        let item =
            self.build_entry(&cache_key, &remaining, entry_tags(decision, bucket.is_some()))?;
        if !self.backend.save_deferred(item)? {
            log::warn!(
                "Deferred save failed while removing decision {}",
                decision.identifier
            );
            return Ok(CacheMutation::default());
        }
        Ok(CacheMutation {
            done: 0,
            deferred: 1,
            tuple: Some(removed),
        })
    }

    fn entry_key(&self, decision: &Decision, bucket: Option<u64>) -> String {
        match bucket {
            Some(bucket) => self.cache_key(KeyPrefix::Ipv4Bucket, &bucket.to_string()),
            None => self.cache_key(decision.scope.into(), &decision.value),
        }
    }

    fn build_entry(
        &self,
        cache_key: &str,
        tuples: &[CachedDecision],
        tags: Vec<String>,
    ) -> Result<CacheItem> {
        // Entry lifetime follows its longest-lived tuple
        let max_expiration = tuples.iter().map(|t| t.expires_at()).max().unwrap_or(0);
        Ok(CacheItem::new(
            key::encode(cache_key),
            serde_json::to_value(tuples)?,
            Some(max_expiration),
            tags,
        ))
    }
}

/// Bucket index integer for an IPv4 address
fn bucket_int(addr: Ipv4Addr) -> u64 {
    u64::from(u32::from(addr)) / IPV4_BUCKET_SIZE
}

fn format_decision(decision: &Decision, bucket: bool) -> CachedDecision {
    let main = if bucket {
        decision.value.clone()
    } else {
        decision.remediation.clone()
    };
    CachedDecision::new(main, decision.expires_at, decision.identifier.clone())
}

fn entry_tags(decision: &Decision, bucket: bool) -> Vec<String> {
    if bucket {
        vec![TAG_RANGE_BUCKET.to_string()]
    } else {
        vec![
            TAG_REMEDIATION.to_string(),
            decision.scope.as_str().to_string(),
        ]
    }
}
