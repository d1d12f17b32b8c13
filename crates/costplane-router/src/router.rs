// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing decisions: which plugins answer a query, and in what order.
//!
//! Order of precedence: pattern match > provider lookup. Candidates are then
//! filtered by the requested feature, deduplicated by plugin name and grouped
//! into tiers of equal priority, highest first. Priority-0 candidates join
//! the first tier. Routing is pure and does no I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use costplane_config::ConfigError;
use costplane_config::model::RoutingConfig;
use costplane_core::{Feature, FeatureSet, ResourceQuery};
use costplane_plugin::{CapabilityCatalog, PluginDescriptor};
use serde::Serialize;
use strum::Display;
use tracing::debug;

use crate::matcher::{MatcherSet, PatternError};
use crate::rules::{RoutingRule, rules_from_config};

/// Why a candidate list was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RouteSource {
    /// A configured resource-type pattern matched.
    Pattern,
    /// Plugins were found through the query's provider.
    Provider,
}

/// One plugin selected to answer a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub plugin: String,
    pub priority: u32,
    /// Whether a retryable failure may advance to the next tier.
    pub fallback: bool,
    /// Effective features this candidate serves for the query.
    pub features: FeatureSet,
}

/// Candidates queried together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tier {
    pub priority: u32,
    /// Ordered by plugin name.
    pub candidates: Vec<Candidate>,
}

/// Ordered, non-empty routing result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateList {
    pub source: RouteSource,
    pub tiers: Vec<Tier>,
}

impl CandidateList {
    /// The first candidate executed.
    pub fn selected(&self) -> Option<&Candidate> {
        self.tiers.first().and_then(|t| t.candidates.first())
    }

    /// Total number of candidates across all tiers.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(|t| t.candidates.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All candidates in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.tiers.iter().flat_map(|t| t.candidates.iter())
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.iter().map(|c| c.plugin.as_str()).collect()
    }
}

/// Outcome of routing one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    Candidates(CandidateList),
    /// No plugin can answer. This is a normal outcome, not an error.
    NoCandidate {
        provider: String,
        source: Option<RouteSource>,
    },
}

impl RouteDecision {
    pub fn candidates(&self) -> Option<&CandidateList> {
        match self {
            RouteDecision::Candidates(list) => Some(list),
            RouteDecision::NoCandidate { .. } => None,
        }
    }

    pub fn is_no_candidate(&self) -> bool {
        matches!(self, RouteDecision::NoCandidate { .. })
    }
}

/// Decides candidate lists from the catalog and routing rules.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    catalog: Arc<CapabilityCatalog>,
    matchers: Arc<MatcherSet>,
    /// Non-pattern rule per plugin name; the last configured entry wins.
    provider_rules: HashMap<String, RoutingRule>,
}

impl RoutingEngine {
    /// Build an engine from already-expanded rules.
    ///
    /// Invalid patterns are skipped and returned.
    pub fn new(catalog: Arc<CapabilityCatalog>, rules: &[RoutingRule]) -> (Self, Vec<PatternError>) {
        let (matchers, errors) = MatcherSet::compile(rules);
        let provider_rules = rules
            .iter()
            .filter(|r| r.pattern.is_none())
            .map(|r| (r.plugin.clone(), r.clone()))
            .collect();
        let engine = Self {
            catalog,
            matchers: Arc::new(matchers),
            provider_rules,
        };
        (engine, errors)
    }

    /// Build an engine from the `[routing]` configuration section.
    ///
    /// Entries that reference an uninstalled plugin or an unknown feature are
    /// dropped; invalid patterns are dropped individually. Every problem is
    /// returned so the caller can report it.
    pub fn from_config(
        catalog: Arc<CapabilityCatalog>,
        config: &RoutingConfig,
    ) -> (Self, Vec<ConfigError>) {
        let (rules, mut errors) = rules_from_config(config);

        let mut known = Vec::with_capacity(rules.len());
        let mut reported = Vec::new();
        for rule in rules {
            if catalog.get(&rule.plugin).is_some() {
                known.push(rule);
            } else if !reported.contains(&rule.plugin) {
                reported.push(rule.plugin.clone());
                errors.push(unknown_plugin_error(&rule.plugin, &catalog));
            }
        }

        let (engine, pattern_errors) = Self::new(catalog, &known);
        errors.extend(pattern_errors.into_iter().map(ConfigError::from));
        (engine, errors)
    }

    pub fn catalog(&self) -> &Arc<CapabilityCatalog> {
        &self.catalog
    }

    pub fn matchers(&self) -> &Arc<MatcherSet> {
        &self.matchers
    }

    /// Route one query. Deterministic: equal inputs give equal decisions.
    pub fn route(&self, query: &ResourceQuery) -> RouteDecision {
        let provider = query.derived_provider();
        let matched = self.matchers.matches(&query.resource_type);

        let (source, raw) = if matched.is_empty() {
            let raw = self
                .catalog
                .lookup(provider)
                .into_iter()
                .map(|d| candidate(d, self.provider_rules.get(&d.name)))
                .collect::<Vec<_>>();
            (RouteSource::Provider, raw)
        } else {
            let raw = matched
                .iter()
                .filter_map(|m| match self.catalog.get(&m.rule.plugin) {
                    Some(d) => Some(candidate(d, Some(&m.rule))),
                    None => {
                        debug!(plugin = %m.rule.plugin, "pattern targets a plugin that is not installed");
                        None
                    }
                })
                .collect::<Vec<_>>();
            (RouteSource::Pattern, raw)
        };

        let filtered = filter_feature(raw, query.feature);
        let tiers = build_tiers(dedup(filtered));

        if tiers.is_empty() {
            debug!(
                resource_type = %query.resource_type,
                provider,
                feature = ?query.feature,
                reason = "no_candidate",
                "routing decision"
            );
            return RouteDecision::NoCandidate {
                provider: provider.to_string(),
                source: (source == RouteSource::Pattern).then_some(source),
            };
        }

        let list = CandidateList { source, tiers };
        let selected = list.selected();
        debug!(
            resource_type = %query.resource_type,
            provider,
            candidates = ?list.plugin_names(),
            selected = selected.map(|c| c.plugin.as_str()).unwrap_or_default(),
            priority = selected.map(|c| c.priority).unwrap_or_default(),
            reason = %source,
            "routing decision"
        );
        RouteDecision::Candidates(list)
    }
}

pub(crate) fn unknown_plugin_error(name: &str, catalog: &CapabilityCatalog) -> ConfigError {
    let names = catalog.names();
    ConfigError::UnknownPlugin {
        name: name.to_string(),
        suggestion: costplane_config::suggest_key(name, &names),
        installed: if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        },
    }
}

fn candidate(descriptor: &PluginDescriptor, rule: Option<&RoutingRule>) -> Candidate {
    Candidate {
        plugin: descriptor.name.clone(),
        priority: rule
            .and_then(|r| r.priority)
            .unwrap_or(descriptor.default_priority),
        fallback: rule.is_none_or(|r| r.fallback),
        features: rule
            .and_then(|r| r.features)
            .unwrap_or(descriptor.features),
    }
}

fn filter_feature(candidates: Vec<Candidate>, feature: Option<Feature>) -> Vec<Candidate> {
    match feature {
        Some(feature) => candidates
            .into_iter()
            .filter(|c| c.features.permits(feature))
            .collect(),
        None => candidates,
    }
}

/// One candidate per plugin, keeping the highest priority (first seen on ties).
fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_name: BTreeMap<String, Candidate> = BTreeMap::new();
    for c in candidates {
        match by_name.get(&c.plugin) {
            Some(existing) if existing.priority >= c.priority => {}
            _ => {
                by_name.insert(c.plugin.clone(), c);
            }
        }
    }
    by_name.into_values().collect()
}

/// Group into tiers by descending priority. Input must be name-ordered.
fn build_tiers(candidates: Vec<Candidate>) -> Vec<Tier> {
    let (zeros, ranked): (Vec<Candidate>, Vec<Candidate>) =
        candidates.into_iter().partition(|c| c.priority == 0);

    let mut groups: BTreeMap<u32, Vec<Candidate>> = BTreeMap::new();
    for c in ranked {
        groups.entry(c.priority).or_default().push(c);
    }

    let mut tiers: Vec<Tier> = groups
        .into_iter()
        .rev()
        .map(|(priority, candidates)| Tier {
            priority,
            candidates,
        })
        .collect();

    if !zeros.is_empty() {
        match tiers.first_mut() {
            Some(first) => {
                first.candidates.extend(zeros);
                first.candidates.sort_by(|a, b| a.plugin.cmp(&b.plugin));
            }
            None => tiers.push(Tier {
                priority: 0,
                candidates: zeros,
            }),
        }
    }
    tiers
}
