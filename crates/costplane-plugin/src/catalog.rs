// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability catalog of installed plugins.
//!
//! The `CapabilityCatalog` stores one `PluginDescriptor` per plugin name.
//! It is filled during startup and then shared read-only (behind an `Arc`)
//! with the router and engine.

use std::collections::BTreeMap;

use tracing::debug;

use crate::manifest::PluginDescriptor;

/// Registry of declared plugin capabilities, keyed by plugin name.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    entries: BTreeMap<String, PluginDescriptor>,
}

impl CapabilityCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add a plugin, replacing any earlier registration under the same name.
    ///
    /// Returns the descriptor that was replaced, if any.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Option<PluginDescriptor> {
        let replaced = self.entries.insert(descriptor.name.clone(), descriptor);
        if let Some(old) = &replaced {
            debug!(plugin = %old.name, old_version = %old.version, "replaced plugin registration");
        }
        replaced
    }

    /// Get a plugin descriptor by name.
    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.entries.get(name)
    }

    /// Plugins declaring `provider` or the wildcard, ordered by name.
    pub fn lookup(&self, provider: &str) -> Vec<&PluginDescriptor> {
        self.entries
            .values()
            .filter(|d| d.supports_provider(provider))
            .collect()
    }

    /// All descriptors, ordered by name.
    pub fn list_all(&self) -> Vec<&PluginDescriptor> {
        self.entries.values().collect()
    }

    /// Names of all registered plugins, ordered.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered plugins.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<PluginDescriptor> for CapabilityCatalog {
    fn from_iter<I: IntoIterator<Item = PluginDescriptor>>(iter: I) -> Self {
        let mut catalog = CapabilityCatalog::new();
        for descriptor in iter {
            catalog.register(descriptor);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costplane_core::{Feature, FeatureSet};

    fn plugin(name: &str, providers: &[&str]) -> PluginDescriptor {
        PluginDescriptor::new(name, semver::Version::new(1, 0, 0))
            .with_providers(providers.iter().copied())
    }

    #[test]
    fn register_and_get_roundtrip() {
        let mut catalog = CapabilityCatalog::new();
        assert!(catalog.register(plugin("aws-public", &["aws"])).is_none());

        let entry = catalog.get("aws-public").unwrap();
        assert_eq!(entry.providers, vec!["aws"]);
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn last_registration_wins() {
        let mut catalog = CapabilityCatalog::new();
        catalog.register(plugin("aws-public", &["aws"]));
        let replaced = catalog.register(
            plugin("aws-public", &["aws", "gcp"])
                .with_features([Feature::Carbon].into_iter().collect::<FeatureSet>()),
        );

        assert!(replaced.is_some());
        assert_eq!(catalog.len(), 1);
        let entry = catalog.get("aws-public").unwrap();
        assert_eq!(entry.providers, vec!["aws", "gcp"]);
        assert!(entry.features.contains(Feature::Carbon));
    }

    #[test]
    fn lookup_matches_exact_and_wildcard() {
        let catalog: CapabilityCatalog = [
            plugin("aws-public", &["aws"]),
            plugin("gcp-public", &["gcp"]),
            plugin("recorder", &["*"]),
            plugin("multi", &["azure", "aws"]),
        ]
        .into_iter()
        .collect();

        let names: Vec<&str> = catalog.lookup("aws").iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["aws-public", "multi", "recorder"]);

        let names: Vec<&str> = catalog
            .lookup("kubernetes")
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["recorder"]);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let catalog: CapabilityCatalog = [plugin("aws-public", &["aws"])].into_iter().collect();
        assert!(catalog.lookup("AWS").is_empty());
    }

    #[test]
    fn list_all_returns_sorted() {
        let catalog: CapabilityCatalog = [
            plugin("zebra", &["aws"]),
            plugin("alpha", &["aws"]),
            plugin("middle", &["aws"]),
        ]
        .into_iter()
        .collect();

        let all = catalog.list_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "alpha");
        assert_eq!(all[1].name, "middle");
        assert_eq!(all[2].name, "zebra");
        assert_eq!(catalog.names(), vec!["alpha", "middle", "zebra"]);
    }

    #[test]
    fn len_and_is_empty() {
        let mut catalog = CapabilityCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.len(), 0);

        catalog.register(plugin("test", &["aws"]));
        assert!(!catalog.is_empty());
        assert_eq!(catalog.len(), 1);
    }
}
