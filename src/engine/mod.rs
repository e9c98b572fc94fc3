//! Remediation engine
//!
//! Orchestrates the two halves of the system: refresh (pull raw decisions
//! from the feed, normalize, store/remove, commit) and query (merge cached
//! decisions across scopes, resolve by priority, track origin statistics).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::cache::{CacheStore, CachedDecision, ORIGINS_COUNT_KEY};
use crate::config::EngineConfig;
use crate::decision::{
    Decision, ORIGIN_CLEAN, ORIGIN_LISTS, ORIGIN_LISTS_SEPARATOR, REMEDIATION_BYPASS, RawDecision,
    Scope, parse_duration_to_seconds,
};
use crate::error::Result;
use crate::feed::DecisionFeed;
use crate::geo::CountryResolver;

pub mod resolve;

pub use resolve::{Resolution, resolve};

/// Counts returned by one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Decisions newly stored by this refresh
    pub new: usize,
    /// Decisions removed by this refresh
    pub deleted: usize,
}

/// Outcome of one store or remove batch
struct BatchOutcome {
    tuples: Vec<CachedDecision>,
}

/// Decision-resolution engine over an injected feed and cache.
///
/// Variant feed behavior (how raw batches are pulled and shaped) belongs
/// entirely to the `DecisionFeed` implementation; the engine owns conversion,
/// persistence and resolution.
pub struct RemediationEngine<F: DecisionFeed> {
    config: EngineConfig,
    cache: Arc<CacheStore>,
    feed: F,
    geo: Option<Arc<dyn CountryResolver>>,
}

impl<F: DecisionFeed> RemediationEngine<F> {
    /// Build an engine from a configuration (validated here), a feed and a
    /// cache store
    pub fn new(config: EngineConfig, feed: F, cache: Arc<CacheStore>) -> Result<Self> {
        let config = config.validate()?;
        log::debug!(
            "Instantiate remediation engine (stream_mode: {}, bouncing_level: {:?})",
            config.stream_mode,
            config.bouncing_level
        );
        Ok(Self {
            config,
            cache,
            feed,
            geo: None,
        })
    }

    /// Attach a country resolver; only consulted when geolocation is enabled
    pub fn with_country_resolver(mut self, geo: Arc<dyn CountryResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Attach a country resolver wrapped in cache-store-backed memoization,
    /// configured from the geolocation section
    pub fn with_cached_country_resolver<R: CountryResolver + 'static>(self, inner: R) -> Self {
        let geo = crate::geo::CachedCountryResolver::new(
            inner,
            self.cache.clone(),
            self.config.geolocation.cache_duration,
            self.config.geolocation.save_result,
        );
        self.with_country_resolver(Arc::new(geo))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Pull fresh decisions from the feed and update the cache.
    ///
    /// Deletions are applied before additions so a decision present in both
    /// batches survives. Each batch is committed once.
    pub async fn refresh_decisions(&self) -> Result<RefreshSummary> {
        let batch = self.feed.pull_decisions().await?;
        let deleted = self.convert_raw_decisions(batch.deleted);
        let new = self.convert_raw_decisions(batch.new);

        let removed = self.remove_decisions(&deleted)?;
        let stored = self.store_decisions(&new)?;

        let summary = RefreshSummary {
            new: stored.tuples.len(),
            deleted: removed.tuples.len(),
        };
        log::info!(
            "Refreshed decisions: {} new, {} deleted",
            summary.new,
            summary.deleted
        );
        Ok(summary)
    }

    /// Resolve the remediation that currently applies to an IP.
    ///
    /// An IP with no covering decision resolves to bypass; only backend I/O
    /// failures surface as errors. Non-bypass outcomes increment the winning
    /// origin's counter.
    pub async fn get_ip_remediation(&self, ip: &str) -> Result<String> {
        let mut decisions = self.all_cached_decisions(ip)?;
        if decisions.is_empty() && !self.config.stream_mode {
            decisions = self.warm_from_feed(ip).await?;
        }

        let resolution = resolve(decisions, &self.config);
        if resolution.remediation != REMEDIATION_BYPASS {
            self.update_origin_count(&resolution.origin)?;
        }
        Ok(resolution.remediation)
    }

    /// Per-origin counters of resolved non-bypass queries
    pub fn origins_count(&self) -> Result<HashMap<String, u64>> {
        match self.cache.get_item(ORIGINS_COUNT_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(HashMap::new()),
        }
    }

    /// Drop every cache entry
    pub fn clear_cache(&self) -> Result<bool> {
        Ok(self.cache.clear()?)
    }

    /// Actively sweep expired cache entries where the backend supports it
    pub fn prune_cache(&self) -> Result<usize> {
        Ok(self.cache.prune()?)
    }

    /// Normalize one raw record into a decision, or reject it.
    ///
    /// Rejection (missing fields, unknown scope, blocklist origin without a
    /// scenario) is logged and never fatal to a batch.
    pub fn convert_raw_decision(&self, raw: &RawDecision) -> Option<Decision> {
        if !validate_raw_decision(raw) {
            return None;
        }
        let Ok(scope) = raw.scope.parse::<Scope>() else {
            log::error!("Raw decision has unsupported scope {:?}", raw.scope);
            return None;
        };
        let remediation = raw.kind.to_lowercase();
        let origin = decision_origin(raw);
        let expires_at = self.decision_expires_at(&remediation, &raw.duration);

        Some(Decision::new(
            scope,
            raw.value.clone(),
            remediation,
            origin,
            expires_at,
        ))
    }

    /// Batch conversion, preserving order and discarding rejects
    pub fn convert_raw_decisions(&self, raws: Vec<RawDecision>) -> Vec<Decision> {
        raws.iter()
            .filter_map(|raw| self.convert_raw_decision(raw))
            .collect()
    }

    fn store_decisions(&self, decisions: &[Decision]) -> Result<BatchOutcome> {
        let mut tuples = Vec::new();
        for decision in decisions {
            let result = self.cache.store_decision(decision)?;
            if let Some(tuple) = result.tuple {
                tuples.push(tuple);
            }
        }
        self.cache.commit()?;
        Ok(BatchOutcome { tuples })
    }

    fn remove_decisions(&self, decisions: &[Decision]) -> Result<BatchOutcome> {
        let mut tuples = Vec::new();
        for decision in decisions {
            let result = self.cache.remove_decision(decision)?;
            if let Some(tuple) = result.tuple {
                tuples.push(tuple);
            }
        }
        self.cache.commit()?;
        Ok(BatchOutcome { tuples })
    }

    /// Merge cached tuples across scopes: exact IP, ranges for IPv4
    /// addresses, and country when geolocation resolves one
    fn all_cached_decisions(&self, ip: &str) -> Result<Vec<CachedDecision>> {
        let mut decisions = self.cache.retrieve_decisions_for_ip(Scope::Ip, ip)?;
        if ip.parse::<Ipv4Addr>().is_ok() {
            decisions.extend(self.cache.retrieve_decisions_for_ip(Scope::Range, ip)?);
        }
        let country = self.country_for_ip(ip);
        if !country.is_empty() {
            decisions.extend(self.cache.retrieve_decisions_for_country(&country)?);
        }
        Ok(decisions)
    }

    fn country_for_ip(&self, ip: &str) -> String {
        if !self.config.geolocation.enabled {
            return String::new();
        }
        let Some(geo) = &self.geo else {
            return String::new();
        };
        match geo.resolve_country(ip) {
            Ok(Some(country)) => country,
            Ok(None) => String::new(),
            Err(err) => {
                log::warn!("Country resolution failed for {}: {}", ip, err);
                String::new()
            }
        }
    }

    /// Live-mode cache warming: ask the feed about one IP and persist the
    /// answer, caching a short-lived clean bypass when the IP has no
    /// decisions. Feeds without per-IP lookup leave the cache untouched.
    async fn warm_from_feed(&self, ip: &str) -> Result<Vec<CachedDecision>> {
        let Some(raws) = self.feed.fetch_decisions_for_ip(ip).await? else {
            return Ok(Vec::new());
        };
        let decisions = if raws.is_empty() {
            let clean = RawDecision {
                scope: Scope::Ip.as_str().to_string(),
                value: ip.to_string(),
                kind: REMEDIATION_BYPASS.to_string(),
                origin: ORIGIN_CLEAN.to_string(),
                duration: format!("{}s", self.config.clean_ip_cache_duration),
                scenario: None,
            };
            self.convert_raw_decisions(vec![clean])
        } else {
            self.convert_raw_decisions(raws)
        };
        self.store_decisions(&decisions)?;
        self.all_cached_decisions(ip)
    }

    fn decision_expires_at(&self, remediation: &str, duration: &str) -> i64 {
        let mut duration = parse_duration_to_seconds(duration);
        if remediation != REMEDIATION_BYPASS && !self.config.stream_mode {
            // Live mode shortens negative decisions so a re-check happens sooner
            duration = duration.min(self.config.bad_ip_cache_duration);
        }
        Utc::now().timestamp() + duration
    }

    fn update_origin_count(&self, origin: &str) -> Result<u64> {
        let counts = self.origins_count()?;
        let count = counts.get(origin).copied().unwrap_or(0) + 1;
        self.cache.upsert_item(
            ORIGINS_COUNT_KEY,
            vec![(origin.to_string(), json!(count))],
            None,
            &[ORIGINS_COUNT_KEY],
        )?;
        Ok(count)
    }
}

fn validate_raw_decision(raw: &RawDecision) -> bool {
    let complete = !raw.scope.is_empty()
        && !raw.value.is_empty()
        && !raw.kind.is_empty()
        && !raw.origin.is_empty()
        && !raw.duration.is_empty();
    // Blocklist decisions are meaningless without their scenario
    let valid = complete
        && !(raw.origin == ORIGIN_LISTS
            && raw.scenario.as_deref().unwrap_or("").is_empty());

    if !valid {
        log::error!("Rejected raw decision: {:?}", raw);
    }
    valid
}

fn decision_origin(raw: &RawDecision) -> String {
    if raw.origin == ORIGIN_LISTS {
        // Presence of the scenario is guaranteed by validation
        format!(
            "{}{}{}",
            raw.origin,
            ORIGIN_LISTS_SEPARATOR,
            raw.scenario.as_deref().unwrap_or("")
        )
    } else {
        raw.origin.clone()
    }
}
