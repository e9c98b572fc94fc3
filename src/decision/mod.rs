//! Decision model
//!
//! A decision is one normalized verdict (ban/captcha/bypass) issued against an
//! IP, a CIDR range, or a country, with an origin and an absolute expiry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod duration;

pub use duration::parse_duration_to_seconds;

/// The most severe built-in remediation
pub const REMEDIATION_BAN: &str = "ban";
/// The challenge remediation
pub const REMEDIATION_CAPTCHA: &str = "captcha";
/// The no-op remediation, always lowest priority
pub const REMEDIATION_BYPASS: &str = "bypass";

/// Origin name used by community blocklist decisions
pub const ORIGIN_LISTS: &str = "lists";
/// Separator between the blocklist origin and its scenario
pub const ORIGIN_LISTS_SEPARATOR: &str = ":";
/// Origin reported when a query resolves to bypass
pub const ORIGIN_CLEAN: &str = "clean";

/// Separator used inside decision identifiers.
///
/// Origins, remediation names and scopes never contain a pipe, so the first
/// segment of an identifier is always the normalized origin.
pub const ID_SEP: &str = "|";

/// Subject-matching granularity of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Ip,
    Range,
    Country,
}

impl Scope {
    /// Lower-case wire name of the scope
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Ip => "ip",
            Scope::Range => "range",
            Scope::Country => "country",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ip" => Ok(Scope::Ip),
            "range" => Ok(Scope::Range),
            "country" => Ok(Scope::Country),
            _ => Err(()),
        }
    }
}

/// Raw decision record as supplied by a feed.
///
/// Fields default to empty strings so that incomplete records deserialize and
/// flow into validation, where they are rejected and logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDecision {
    #[serde(default)]
    pub scope: String,

    #[serde(default)]
    pub value: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub origin: String,

    #[serde(default)]
    pub duration: String,

    /// Required when `origin` is the blocklist origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

/// One normalized, immutable verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// De-duplication key, `origin|remediation|scope|value`
    pub identifier: String,

    pub scope: Scope,

    /// The subject: an IP literal, a CIDR range literal, or a country code
    pub value: String,

    /// Normalized (lower-cased) remediation name
    pub remediation: String,

    /// Source of the decision, `lists:<scenario>` for blocklist decisions
    pub origin: String,

    /// Absolute Unix timestamp after which the decision no longer applies
    pub expires_at: i64,
}

impl Decision {
    /// Build a decision from already-normalized parts, deriving the identifier
    pub fn new(
        scope: Scope,
        value: String,
        remediation: String,
        origin: String,
        expires_at: i64,
    ) -> Self {
        let identifier = format!(
            "{}{ID_SEP}{}{ID_SEP}{}{ID_SEP}{}",
            origin.to_lowercase(),
            remediation,
            scope,
            value
        );
        Self {
            identifier,
            scope,
            value,
            remediation,
            origin,
            expires_at,
        }
    }
}
