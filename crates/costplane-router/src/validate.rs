// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static validation of routing configuration against installed plugins.

use std::collections::HashMap;
use std::fmt;

use costplane_config::ConfigError;
use costplane_config::model::{PatternConfig, RoutingConfig};
use costplane_core::FeatureSet;
use costplane_plugin::CapabilityCatalog;
use serde::Serialize;

use crate::matcher::MatcherSet;
use crate::router::{RouteSource, unknown_plugin_error};
use crate::rules::entry_rules;

/// One installed plugin as routing will see it.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub version: String,
    pub providers: Vec<String>,
    pub features: FeatureSet,
    /// Priority used for provider routing.
    pub priority: u32,
    /// Whether a routing entry configures this plugin.
    pub configured: bool,
}

/// One routing rule derivable from configuration and installed plugins.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSummary {
    pub plugin: String,
    pub source: RouteSource,
    pub pattern: Option<PatternConfig>,
    pub features: FeatureSet,
    pub priority: u32,
    pub fallback: bool,
}

/// Result of [`validate`].
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub plugins: Vec<PluginSummary>,
    pub rules: Vec<RuleSummary>,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when there are no errors. Warnings do not fail validation.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plugins ({}):", self.plugins.len())?;
        for p in &self.plugins {
            writeln!(
                f,
                "  {} {}  providers=[{}] features={} priority={}",
                p.name,
                p.version,
                p.providers.join(","),
                p.features,
                p.priority
            )?;
        }
        writeln!(f, "rules ({}):", self.rules.len())?;
        for r in &self.rules {
            match &r.pattern {
                Some(p) => writeln!(
                    f,
                    "  {} {} `{}` -> {} priority={} fallback={} features={}",
                    r.source, p.kind, p.pattern, r.plugin, r.priority, r.fallback, r.features
                )?,
                None => writeln!(
                    f,
                    "  {} -> {} priority={} fallback={} features={}",
                    r.source, r.plugin, r.priority, r.fallback, r.features
                )?,
            }
        }
        for w in &self.warnings {
            writeln!(f, "warning: {w}")?;
        }
        for e in &self.errors {
            writeln!(f, "error: {e}")?;
        }
        Ok(())
    }
}

/// Check routing configuration against the catalog without launching
/// anything. Collects every error instead of stopping at the first.
pub fn validate(config: &RoutingConfig, catalog: &CapabilityCatalog) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut provider_priority: HashMap<&str, u32> = HashMap::new();
    let mut seen_patterns: HashMap<(String, String), String> = HashMap::new();

    for entry in &config.plugins {
        let Some(descriptor) = catalog.get(&entry.name) else {
            report.errors.push(unknown_plugin_error(&entry.name, catalog));
            continue;
        };

        let rules = match entry_rules(entry) {
            Ok(rules) => rules,
            Err(errors) => {
                report.errors.extend(errors);
                continue;
            }
        };

        if let Some(subset) = rules.first().and_then(|r| r.features)
            && !descriptor.features.is_unrestricted()
        {
            for feature in subset.iter() {
                if !descriptor.features.contains(feature) {
                    report.warnings.push(format!(
                        "plugin `{}` is routed for {feature} but does not declare it",
                        entry.name
                    ));
                }
            }
        }

        // Routing skips patterns that do not compile, so the report does too.
        let rules = match MatcherSet::compile_strict(&rules) {
            Ok(_) => rules,
            Err(errors) => {
                let rules = rules
                    .into_iter()
                    .filter(|rule| {
                        !rule.pattern.as_ref().is_some_and(|p| {
                            errors.0.iter().any(|e| e.kind == p.kind && e.pattern == p.pattern)
                        })
                    })
                    .collect();
                report
                    .errors
                    .extend(errors.0.into_iter().map(ConfigError::from));
                rules
            }
        };

        for pattern in &entry.patterns {
            let key = (pattern.kind.to_string(), pattern.pattern.clone());
            if let Some(first) = seen_patterns.get(&key) {
                report.warnings.push(format!(
                    "{} pattern `{}` is configured for both `{first}` and `{}`",
                    pattern.kind, pattern.pattern, entry.name
                ));
            } else {
                seen_patterns.insert(key, entry.name.clone());
            }
        }

        for rule in &rules {
            let priority = rule.priority.unwrap_or(descriptor.default_priority);
            if rule.pattern.is_none() {
                provider_priority.insert(descriptor.name.as_str(), priority);
            }
            report.rules.push(RuleSummary {
                plugin: rule.plugin.clone(),
                source: if rule.pattern.is_some() {
                    RouteSource::Pattern
                } else {
                    RouteSource::Provider
                },
                pattern: rule.pattern.clone(),
                features: rule.features.unwrap_or(descriptor.features),
                priority,
                fallback: rule.fallback,
            });
        }
    }

    for descriptor in catalog.list_all() {
        let configured = provider_priority.get(descriptor.name.as_str()).copied();
        if configured.is_none() {
            report.warnings.push(format!(
                "plugin `{}` has no routing entry; it routes by provider with default priority {}",
                descriptor.name, descriptor.default_priority
            ));
            report.rules.push(RuleSummary {
                plugin: descriptor.name.clone(),
                source: RouteSource::Provider,
                pattern: None,
                features: descriptor.features,
                priority: descriptor.default_priority,
                fallback: true,
            });
        }
        if descriptor.providers.is_empty() {
            report.warnings.push(format!(
                "plugin `{}` declares no providers and is reachable only through patterns",
                descriptor.name
            ));
        }
        report.plugins.push(PluginSummary {
            name: descriptor.name.clone(),
            version: descriptor.version.to_string(),
            providers: descriptor.providers.clone(),
            features: descriptor.features,
            priority: configured.unwrap_or(descriptor.default_priority),
            configured: configured.is_some(),
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use costplane_config::model::RoutingEntry;
    use costplane_core::Feature;
    use costplane_plugin::PluginDescriptor;

    fn catalog() -> CapabilityCatalog {
        [
            PluginDescriptor::new("aws-public", semver::Version::new(1, 2, 0))
                .with_providers(["aws"])
                .with_priority(10),
            PluginDescriptor::new("eks-costs", semver::Version::new(0, 3, 1))
                .with_providers(["aws"])
                .with_features([Feature::ProjectedCosts].into_iter().collect()),
        ]
        .into_iter()
        .collect()
    }

    fn entry(name: &str) -> RoutingEntry {
        RoutingEntry {
            name: name.into(),
            features: vec![],
            patterns: vec![],
            priority: None,
            fallback: true,
        }
    }

    #[test]
    fn clean_config_lists_plugins_and_rules() {
        let mut eks = entry("eks-costs");
        eks.priority = Some(30);
        eks.patterns = vec![PatternConfig::glob("aws:eks:*")];
        let config = RoutingConfig {
            plugins: vec![eks, entry("aws-public")],
        };

        let report = validate(&config, &catalog());
        assert!(report.is_ok(), "{report}");
        assert_eq!(report.plugins.len(), 2);
        assert!(report.plugins.iter().all(|p| p.configured));
        let eks_summary = report.plugins.iter().find(|p| p.name == "eks-costs").unwrap();
        assert_eq!(eks_summary.priority, 30);
        assert_eq!(report.rules.len(), 3);
        assert_eq!(report.rules[0].source, RouteSource::Pattern);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn every_error_is_collected() {
        let mut bad_pattern = entry("eks-costs");
        bad_pattern.patterns = vec![PatternConfig::regex("aws:(eks"), PatternConfig::glob("[x")];
        let mut bad_feature = entry("aws-public");
        bad_feature.features = vec!["Carbn".into()];
        let config = RoutingConfig {
            plugins: vec![entry("gcp-public"), bad_pattern, bad_feature],
        };

        let report = validate(&config, &catalog());
        assert!(!report.is_ok());
        assert_eq!(report.errors.len(), 4);
        assert!(matches!(report.errors[0], ConfigError::UnknownPlugin { .. }));
        assert!(matches!(report.errors[1], ConfigError::InvalidPattern { .. }));
        assert!(matches!(report.errors[2], ConfigError::InvalidPattern { .. }));
        assert!(matches!(report.errors[3], ConfigError::UnsupportedFeature { .. }));
    }

    #[test]
    fn invalid_patterns_are_left_out_of_the_rules() {
        let mut eks = entry("eks-costs");
        eks.patterns = vec![PatternConfig::glob("aws:eks:*"), PatternConfig::regex("aws:(eks")];
        let config = RoutingConfig { plugins: vec![eks] };

        let report = validate(&config, &catalog());
        assert_eq!(report.errors.len(), 1);
        let eks_rules: Vec<_> = report.rules.iter().filter(|r| r.plugin == "eks-costs").collect();
        assert_eq!(eks_rules.len(), 2);
        assert_eq!(eks_rules[0].pattern, Some(PatternConfig::glob("aws:eks:*")));
        assert!(eks_rules[1].pattern.is_none());
    }

    #[test]
    fn warnings_for_undeclared_feature_duplicates_and_unconfigured() {
        let mut eks = entry("eks-costs");
        eks.features = vec!["Carbon".into()];
        eks.patterns = vec![PatternConfig::glob("aws:eks:*")];
        let mut public = entry("aws-public");
        public.patterns = vec![PatternConfig::glob("aws:eks:*")];
        let config = RoutingConfig {
            plugins: vec![eks, public],
        };

        let report = validate(&config, &catalog());
        assert!(report.is_ok());
        assert!(report.warnings.iter().any(|w| w.contains("does not declare")));
        assert!(report.warnings.iter().any(|w| w.contains("configured for both")));

        let empty = validate(&RoutingConfig::default(), &catalog());
        assert!(empty.is_ok());
        assert_eq!(
            empty
                .warnings
                .iter()
                .filter(|w| w.contains("no routing entry"))
                .count(),
            2
        );
        assert_eq!(empty.rules.len(), 2);
    }

    #[test]
    fn report_renders_as_text() {
        let report = validate(&RoutingConfig::default(), &catalog());
        let text = report.to_string();
        assert!(text.contains("aws-public 1.2.0"));
        assert!(text.contains("warning:"));
    }
}
