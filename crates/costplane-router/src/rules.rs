// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing rules derived from `[[routing.plugins]]` entries.

use std::str::FromStr;

use costplane_config::model::{PatternConfig, RoutingConfig, RoutingEntry};
use costplane_config::{ConfigError, suggest_key};
use costplane_core::{Feature, FeatureSet};

/// One configured override. Immutable after construction.
///
/// An entry with N patterns yields N pattern rules plus one provider rule;
/// the provider rule applies when the plugin is reached through its declared
/// providers instead of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub plugin: String,
    /// Feature subset this rule applies to; `None` inherits the plugin's
    /// declared features.
    pub features: Option<FeatureSet>,
    pub pattern: Option<PatternConfig>,
    /// `None` defers to the plugin's declared default priority.
    pub priority: Option<u32>,
    pub fallback: bool,
}

impl RoutingRule {
    pub fn provider(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            features: None,
            pattern: None,
            priority: None,
            fallback: true,
        }
    }

    pub fn pattern(plugin: impl Into<String>, pattern: PatternConfig) -> Self {
        Self {
            pattern: Some(pattern),
            ..Self::provider(plugin)
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = Some(features);
        self
    }
}

/// Parse feature names, reporting every unknown name.
pub fn parse_features(plugin: &str, names: &[String]) -> Result<Option<FeatureSet>, Vec<ConfigError>> {
    if names.is_empty() {
        return Ok(None);
    }
    let valid: Vec<String> = Feature::ALL.iter().map(ToString::to_string).collect();
    let valid_refs: Vec<&str> = valid.iter().map(String::as_str).collect();

    let mut set = FeatureSet::unrestricted();
    let mut errors = Vec::new();
    for name in names {
        match Feature::from_str(name) {
            Ok(feature) => set.insert(feature),
            Err(_) => errors.push(ConfigError::UnsupportedFeature {
                plugin: plugin.to_string(),
                feature: name.clone(),
                suggestion: suggest_key(name, &valid_refs),
                valid: valid.join(", "),
            }),
        }
    }
    if errors.is_empty() {
        Ok(Some(set))
    } else {
        Err(errors)
    }
}

/// Expand one entry into its rules.
pub fn entry_rules(entry: &RoutingEntry) -> Result<Vec<RoutingRule>, Vec<ConfigError>> {
    let features = parse_features(&entry.name, &entry.features)?;
    let base = RoutingRule {
        plugin: entry.name.clone(),
        features,
        pattern: None,
        priority: entry.priority,
        fallback: entry.fallback,
    };
    let mut rules = Vec::with_capacity(entry.patterns.len() + 1);
    for pattern in &entry.patterns {
        rules.push(RoutingRule {
            pattern: Some(pattern.clone()),
            ..base.clone()
        });
    }
    rules.push(base);
    Ok(rules)
}

/// Expand every entry. An entry with an unsupported feature is dropped as a
/// whole and its errors returned; other entries are unaffected.
pub fn rules_from_config(config: &RoutingConfig) -> (Vec<RoutingRule>, Vec<ConfigError>) {
    let mut rules = Vec::new();
    let mut errors = Vec::new();
    for entry in &config.plugins {
        match entry_rules(entry) {
            Ok(mut entry_rules) => rules.append(&mut entry_rules),
            Err(mut entry_errors) => errors.append(&mut entry_errors),
        }
    }
    (rules, errors)
}
