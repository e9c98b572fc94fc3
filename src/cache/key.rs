//! Cache key convention
//!
//! Keys are `<prefix>_<value>` with every character outside `[A-Za-z0-9_.]`
//! replaced by `_`, then base64-encoded before handoff to the backend. The
//! sanitized layout is part of the persisted-state format and must stay
//! stable across restarts and backends to preserve warm caches.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::decision::Scope;

/// Separator between prefix and value
pub const KEY_SEP: char = '_';

/// The fixed set of cache key prefixes.
///
/// Anything else is a configuration mistake, which the type system rules out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPrefix {
    /// Exact-IP scoped decisions
    Ip,
    /// Canonical range-scoped decisions
    Range,
    /// Country scoped decisions
    Country,
    /// IPv4 range bucket index
    Ipv4Bucket,
    /// Cached geolocation variables
    Geolocation,
}

impl KeyPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPrefix::Ip => "ip",
            KeyPrefix::Range => "range",
            KeyPrefix::Country => "country",
            KeyPrefix::Ipv4Bucket => "range_bucket_ipv4",
            KeyPrefix::Geolocation => "geolocation",
        }
    }
}

impl fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Scope> for KeyPrefix {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Ip => KeyPrefix::Ip,
            Scope::Range => KeyPrefix::Range,
            Scope::Country => KeyPrefix::Country,
        }
    }
}

/// Build a sanitized cache key for a prefix and value
pub fn build(prefix: KeyPrefix, value: &str) -> String {
    let raw = format!("{}{}{}", prefix, KEY_SEP, value);
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                KEY_SEP
            }
        })
        .collect()
}

/// Encode a sanitized key for backend handoff
pub fn encode(key: &str) -> String {
    BASE64.encode(key)
}
