//! End-to-end engine tests over an in-memory cache and a mock feed

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use veto::cache::KeyPrefix;
use veto::{
    BouncingLevel, CacheStore, DecisionBatch, DecisionFeed, EngineConfig, MemoryBackend,
    RawDecision, RemediationEngine, Result, StaticCountryResolver,
};

/// Mock feed serving a fixed batch, with optional per-IP lookup support.
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to swap the batch between refreshes.
#[derive(Clone, Default)]
struct MockFeed {
    batch: Arc<Mutex<DecisionBatch>>,
    per_ip: Arc<Mutex<Option<Vec<RawDecision>>>>,
}

impl MockFeed {
    fn with_batch(batch: DecisionBatch) -> Self {
        Self {
            batch: Arc::new(Mutex::new(batch)),
            per_ip: Arc::default(),
        }
    }

    fn with_per_ip(self, decisions: Vec<RawDecision>) -> Self {
        *self.per_ip.lock().unwrap() = Some(decisions);
        self
    }

    fn set_batch(&self, batch: DecisionBatch) {
        *self.batch.lock().unwrap() = batch;
    }
}

#[async_trait]
impl DecisionFeed for MockFeed {
    async fn pull_decisions(&self) -> Result<DecisionBatch> {
        Ok(self.batch.lock().unwrap().clone())
    }

    async fn fetch_decisions_for_ip(&self, _ip: &str) -> Result<Option<Vec<RawDecision>>> {
        Ok(self.per_ip.lock().unwrap().clone())
    }
}

fn raw(scope: &str, value: &str, kind: &str, origin: &str, duration: &str) -> RawDecision {
    RawDecision {
        scope: scope.to_string(),
        value: value.to_string(),
        kind: kind.to_string(),
        origin: origin.to_string(),
        duration: duration.to_string(),
        scenario: None,
    }
}

fn engine_with(config: EngineConfig, feed: MockFeed) -> RemediationEngine<MockFeed> {
    let cache = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new())));
    RemediationEngine::new(config, feed, cache).unwrap()
}

#[tokio::test]
async fn range_decision_applies_inside_range_only() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![raw("range", "192.168.1.0/24", "ban", "capi", "4h")],
        deleted: vec![],
    });
    let engine = engine_with(EngineConfig::default(), feed.clone());

    let summary = engine.refresh_decisions().await.unwrap();
    assert_eq!(summary.new, 1);
    assert_eq!(summary.deleted, 0);

    assert_eq!(engine.get_ip_remediation("192.168.1.42").await.unwrap(), "ban");
    assert_eq!(engine.get_ip_remediation("192.168.2.1").await.unwrap(), "bypass");
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![raw("ip", "1.2.3.4", "ban", "capi", "4h")],
        deleted: vec![],
    });
    let engine = engine_with(EngineConfig::default(), feed.clone());

    assert_eq!(engine.refresh_decisions().await.unwrap().new, 1);
    assert_eq!(engine.refresh_decisions().await.unwrap().new, 0);
}

#[tokio::test]
async fn invalid_records_are_skipped_not_fatal() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![
            raw("ip", "1.2.3.4", "ban", "capi", "4h"),
            raw("", "", "", "", ""),
            raw("range", "2001:db8::/32", "ban", "capi", "4h"),
            raw("ip", "1.2.3.5", "ban", "lists", "4h"), // missing scenario
        ],
        deleted: vec![],
    });
    let engine = engine_with(EngineConfig::default(), feed.clone());

    let summary = engine.refresh_decisions().await.unwrap();
    assert_eq!(summary.new, 1);
    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "ban");
}

#[tokio::test]
async fn mixed_scope_round_trip_resolves_and_clears() {
    let new = vec![
        raw("ip", "1.2.3.4", "captcha", "capi", "4h"),
        raw("range", "1.2.3.0/24", "ban", "capi", "4h"),
        raw("country", "FR", "captcha", "capi", "4h"),
    ];
    let feed = MockFeed::with_batch(DecisionBatch {
        new: new.clone(),
        deleted: vec![],
    });

    let cache = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new())));
    let geo = StaticCountryResolver::new().with_country("1.2.3.4", "FR");
    let config = EngineConfig {
        geolocation: veto::GeolocationConfig {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = RemediationEngine::new(config, feed.clone(), cache)
        .unwrap()
        .with_cached_country_resolver(geo);

    let summary = engine.refresh_decisions().await.unwrap();
    assert_eq!(summary.new, 3);

    // The range ban outranks both captchas
    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "ban");

    // Withdraw everything; the verdict falls back to bypass
    feed.set_batch(DecisionBatch {
        new: vec![],
        deleted: new,
    });
    let summary = engine.refresh_decisions().await.unwrap();
    assert_eq!(summary.deleted, 3);
    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "bypass");
}

#[tokio::test]
async fn unknown_remediation_resolves_to_fallback() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![raw("ip", "1.2.3.4", "mystery", "capi", "4h")],
        deleted: vec![],
    });
    let config = EngineConfig {
        fallback_remediation: "captcha".to_string(),
        ..Default::default()
    };
    let engine = engine_with(config, feed.clone());

    engine.refresh_decisions().await.unwrap();
    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "captcha");
}

#[tokio::test]
async fn flex_bouncing_level_caps_ban() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![raw("ip", "1.2.3.4", "ban", "capi", "4h")],
        deleted: vec![],
    });
    let config = EngineConfig {
        bouncing_level: BouncingLevel::Flex,
        ..Default::default()
    };
    let engine = engine_with(config, feed.clone());

    engine.refresh_decisions().await.unwrap();
    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "captcha");
}

#[tokio::test]
async fn disabled_bouncing_level_counts_nothing() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![raw("ip", "1.2.3.4", "ban", "capi", "4h")],
        deleted: vec![],
    });
    let config = EngineConfig {
        bouncing_level: BouncingLevel::Disabled,
        ..Default::default()
    };
    let engine = engine_with(config, feed.clone());

    engine.refresh_decisions().await.unwrap();
    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "bypass");
    assert!(engine.origins_count().unwrap().is_empty());
}

#[tokio::test]
async fn origin_counts_accumulate_per_non_bypass_query() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![raw("ip", "1.2.3.4", "ban", "capi", "4h")],
        deleted: vec![],
    });
    let engine = engine_with(EngineConfig::default(), feed.clone());

    engine.refresh_decisions().await.unwrap();
    engine.get_ip_remediation("1.2.3.4").await.unwrap();
    engine.get_ip_remediation("1.2.3.4").await.unwrap();
    engine.get_ip_remediation("10.0.0.1").await.unwrap(); // bypass, not counted

    let counts = engine.origins_count().unwrap();
    assert_eq!(counts.get("capi"), Some(&2));
    assert_eq!(counts.len(), 1);
}

#[tokio::test]
async fn expired_decision_is_ignored_and_entry_pruned_on_read() {
    let feed = MockFeed::with_batch(DecisionBatch {
        // Negative duration: expired the moment it is stored
        new: vec![raw("ip", "1.2.3.4", "ban", "capi", "-45m")],
        deleted: vec![],
    });
    let engine = engine_with(EngineConfig::default(), feed.clone());
    engine.refresh_decisions().await.unwrap();

    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "bypass");

    // The read noticed the entry was fully expired and dropped it
    let cache = engine.cache();
    let key = cache.cache_key(KeyPrefix::Ip, "1.2.3.4");
    assert!(cache.get_item(&key).unwrap().is_none());
}

#[tokio::test]
async fn live_mode_stores_clean_bypass_on_feed_miss() {
    let feed = MockFeed::default().with_per_ip(vec![]);
    let config = EngineConfig {
        stream_mode: false,
        ..Default::default()
    };
    let engine = engine_with(config, feed.clone());

    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "bypass");

    // The clean verdict was cached for the next query
    let cache = engine.cache();
    let key = cache.cache_key(KeyPrefix::Ip, "1.2.3.4");
    assert!(cache.get_item(&key).unwrap().is_some());
}

#[tokio::test]
async fn live_mode_stores_feed_decisions_for_ip() {
    let feed = MockFeed::default().with_per_ip(vec![raw("ip", "1.2.3.4", "ban", "capi", "4h")]);
    let config = EngineConfig {
        stream_mode: false,
        ..Default::default()
    };
    let engine = engine_with(config, feed.clone());

    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "ban");
}

#[tokio::test]
async fn stream_mode_never_asks_feed_per_ip() {
    // If the engine asked, this per-IP answer would turn the query into a ban
    let feed = MockFeed::default().with_per_ip(vec![raw("ip", "1.2.3.4", "ban", "capi", "4h")]);
    let engine = engine_with(EngineConfig::default(), feed.clone());

    assert_eq!(engine.get_ip_remediation("1.2.3.4").await.unwrap(), "bypass");
}

#[tokio::test]
async fn non_ipv4_query_skips_range_scope() {
    let feed = MockFeed::with_batch(DecisionBatch {
        new: vec![raw("ip", "2001:db8::1", "ban", "capi", "4h")],
        deleted: vec![],
    });
    let engine = engine_with(EngineConfig::default(), feed.clone());
    engine.refresh_decisions().await.unwrap();

    // Exact-IP decisions still apply to IPv6 addresses
    assert_eq!(engine.get_ip_remediation("2001:db8::1").await.unwrap(), "ban");
}
