//! Priority resolution
//!
//! Merged cache tuples go in, one capped remediation comes out. Priorities
//! are index positions in the configured ordered list, so "more severe" is
//! always "numerically lower".

use std::cmp::Ordering;

use crate::cache::{CacheStore, CachedDecision};
use crate::config::EngineConfig;
use crate::decision::{ORIGIN_CLEAN, REMEDIATION_BYPASS};

/// Outcome of resolving a set of cached decisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Capped remediation name
    pub remediation: String,
    /// Origin of the winning decision, `clean` for a bypass outcome
    pub origin: String,
}

struct Prioritized {
    decision: CachedDecision,
    priority: usize,
}

/// Compare two priority-tagged tuples; used with a stable sort, so ties keep
/// their input order
fn compare_priorities(a: &Prioritized, b: &Prioritized) -> Ordering {
    a.priority.cmp(&b.priority)
}

/// Resolve merged cache tuples into one remediation and its origin.
///
/// Expired tuples are dropped, unknown remediation types are substituted with
/// the configured fallback, the highest-priority survivor wins, and the
/// bouncing level caps the outcome. An empty set resolves to bypass.
pub fn resolve(decisions: Vec<CachedDecision>, config: &EngineConfig) -> Resolution {
    let clean = CacheStore::clean_cached_values(decisions);
    let sorted = sort_decisions_by_priority(clean, config);
    log::debug!(
        "Decisions sorted by priority: {:?}",
        sorted
            .iter()
            .map(|p| (p.decision.main(), p.priority))
            .collect::<Vec<_>>()
    );

    let (highest, origin) = match sorted.first() {
        Some(first) => (
            first.decision.main().to_string(),
            first.decision.origin().to_string(),
        ),
        None => (REMEDIATION_BYPASS.to_string(), String::new()),
    };

    let capped = cap_remediation_level(highest, config);
    let origin = if capped == REMEDIATION_BYPASS {
        ORIGIN_CLEAN.to_string()
    } else {
        origin
    };

    log::info!("Final remediation: {}", capped);
    Resolution {
        remediation: capped,
        origin,
    }
}

/// Attach priorities, substituting the fallback for unknown remediations,
/// and stable-sort ascending
fn sort_decisions_by_priority(
    decisions: Vec<CachedDecision>,
    config: &EngineConfig,
) -> Vec<Prioritized> {
    let ordered = &config.ordered_remediations;
    let fallback = &config.fallback_remediation;
    let mut prioritized: Vec<Prioritized> = decisions
        .into_iter()
        .map(|decision| match position_of(ordered, decision.main()) {
            Some(priority) => Prioritized { decision, priority },
            None => {
                log::debug!(
                    "Unknown remediation {:?}, using fallback {:?}",
                    decision.main(),
                    fallback
                );
                let priority = position_of(ordered, fallback).unwrap_or(0);
                let decision = CachedDecision::new(
                    fallback.clone(),
                    decision.expires_at(),
                    decision.identifier().to_string(),
                );
                Prioritized { decision, priority }
            }
        })
        .collect();
    prioritized.sort_by(compare_priorities);
    prioritized
}

/// Cap a remediation to the maximum the bouncing level permits
fn cap_remediation_level(remediation: String, config: &EngineConfig) -> String {
    if remediation == REMEDIATION_BYPASS {
        return remediation;
    }

    let ordered = &config.ordered_remediations;
    let max_remediation = config.bouncing_level.max_remediation();
    let current_index = position_of(ordered, &remediation).unwrap_or(0);
    let max_index = position_of(ordered, max_remediation).unwrap_or(0);
    if current_index < max_index {
        let capped = ordered[max_index].clone();
        log::debug!("Remediation {} capped to {}", remediation, capped);
        return capped;
    }

    remediation
}

fn position_of(ordered: &[String], remediation: &str) -> Option<usize> {
    ordered.iter().position(|r| r == remediation)
}
