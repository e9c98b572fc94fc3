//! veto - decision cache and remediation resolution core for network bouncers
//!
//! Ingests threat-intelligence decisions (ban/captcha/bypass verdicts issued
//! against an IP, a CIDR range, or a country), persists them in a scoped
//! cache, and answers the hot-path question "what remediation applies to this
//! IP right now?" by merging decisions across scopes, resolving by priority,
//! and capping the outcome by bouncing level.
//!
//! The cache backend, the upstream decision feed, and the geolocation
//! resolver are pluggable collaborators; the crate ships in-memory and SQLite
//! backends and a file-based feed.

pub mod cache;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod feed;
pub mod geo;

pub use cache::{CacheBackend, CacheItem, CacheStore, CachedDecision, MemoryBackend, SqliteBackend};
pub use config::{BouncingLevel, EngineConfig, GeolocationConfig};
pub use decision::{Decision, RawDecision, Scope, parse_duration_to_seconds};
pub use engine::{RefreshSummary, RemediationEngine, Resolution, resolve};
pub use error::{CacheError, ConfigError, Error, FeedError, Result};
pub use feed::{DecisionBatch, DecisionFeed, FileFeed};
pub use geo::{CachedCountryResolver, CountryResolver, StaticCountryResolver};
