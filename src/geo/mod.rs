//! Geolocation collaborator
//!
//! Maps an IP to a country code for country-scoped decisions. Resolution
//! failures are the caller's cue to skip the country lookup, never an excuse
//! to fail a query.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::cache::key::KeyPrefix;
use crate::cache::{CacheStore, TAG_GEOLOCATION};
use crate::error::Result;

/// Resolves an IP to an ISO country code
pub trait CountryResolver: Send + Sync {
    /// `None` when the IP cannot be attributed to a country
    fn resolve_country(&self, ip: &str) -> Result<Option<String>>;
}

/// Fixture resolver over a fixed IP-to-country table
#[derive(Default)]
pub struct StaticCountryResolver {
    countries: HashMap<String, String>,
}

impl StaticCountryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(mut self, ip: &str, country: &str) -> Self {
        self.countries.insert(ip.to_string(), country.to_string());
        self
    }
}

impl CountryResolver for StaticCountryResolver {
    fn resolve_country(&self, ip: &str) -> Result<Option<String>> {
        Ok(self.countries.get(ip).cloned())
    }
}

/// Caching wrapper around any resolver.
///
/// Resolved countries are memoized in the cache store under the geolocation
/// prefix so repeated queries for one IP skip the inner resolver.
pub struct CachedCountryResolver<R: CountryResolver> {
    inner: R,
    cache: Arc<CacheStore>,
    cache_duration: i64,
    save_result: bool,
}

impl<R: CountryResolver> CachedCountryResolver<R> {
    pub fn new(inner: R, cache: Arc<CacheStore>, cache_duration: i64, save_result: bool) -> Self {
        Self {
            inner,
            cache,
            cache_duration,
            save_result,
        }
    }
}

impl<R: CountryResolver> CountryResolver for CachedCountryResolver<R> {
    fn resolve_country(&self, ip: &str) -> Result<Option<String>> {
        let cached = self
            .cache
            .get_ip_variables(KeyPrefix::Geolocation, &["country"], ip)?;
        if let Some(Some(Value::String(country))) = cached.get("country").cloned() {
            return Ok(Some(country));
        }

        let resolved = self.inner.resolve_country(ip)?;
        if self.save_result
            && let Some(country) = &resolved
        {
            self.cache.set_ip_variables(
                KeyPrefix::Geolocation,
                vec![("country".to_string(), json!(country))],
                ip,
                self.cache_duration,
                TAG_GEOLOCATION,
            )?;
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use std::sync::Mutex;

    struct CountingResolver {
        calls: Mutex<usize>,
    }

    impl CountryResolver for CountingResolver {
        fn resolve_country(&self, _ip: &str) -> Result<Option<String>> {
            *self.calls.lock().unwrap() += 1;
            Ok(Some("FR".to_string()))
        }
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticCountryResolver::new().with_country("1.2.3.4", "FR");
        assert_eq!(resolver.resolve_country("1.2.3.4").unwrap(), Some("FR".to_string()));
        assert_eq!(resolver.resolve_country("9.9.9.9").unwrap(), None);
    }

    #[test]
    fn test_cached_resolver_calls_inner_once() {
        let cache = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new())));
        let inner = CountingResolver {
            calls: Mutex::new(0),
        };
        let resolver = CachedCountryResolver::new(inner, cache, 3600, true);

        assert_eq!(resolver.resolve_country("1.2.3.4").unwrap(), Some("FR".to_string()));
        assert_eq!(resolver.resolve_country("1.2.3.4").unwrap(), Some("FR".to_string()));
        assert_eq!(*resolver.inner.calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_cached_resolver_without_save_result() {
        let cache = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new())));
        let inner = CountingResolver {
            calls: Mutex::new(0),
        };
        let resolver = CachedCountryResolver::new(inner, cache, 3600, false);

        resolver.resolve_country("1.2.3.4").unwrap();
        resolver.resolve_country("1.2.3.4").unwrap();
        assert_eq!(*resolver.inner.calls.lock().unwrap(), 2);
    }
}
