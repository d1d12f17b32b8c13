// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin descriptors and `plugin.toml` manifest parsing.
//!
//! A descriptor records what a plugin says about itself: which providers it
//! prices, which features it serves, and the priority it asks for when no
//! routing rule overrides it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use costplane_core::{CostplaneError, Feature, FeatureSet, PluginInfo, WILDCARD_PROVIDER};
use serde::{Deserialize, Serialize};

/// Identity of one installed plugin build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    pub name: String,
    pub version: semver::Version,
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Declared metadata of one installed plugin. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: semver::Version,
    pub description: String,
    /// Providers this plugin prices, sorted and deduplicated. `*` matches all.
    pub providers: Vec<String>,
    /// Features served. Empty means every feature.
    pub features: FeatureSet,
    /// Priority used when no routing rule sets one.
    pub default_priority: u32,
    /// Executable launched by the plugin host.
    pub executable: PathBuf,
    /// Extra arguments passed before the host's addressing flags.
    pub args: Vec<String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, version: semver::Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: String::new(),
            providers: Vec::new(),
            features: FeatureSet::unrestricted(),
            default_priority: 0,
            executable: PathBuf::new(),
            args: Vec::new(),
        }
    }

    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = normalize_providers(providers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn key(&self) -> PluginKey {
        PluginKey {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Whether this plugin declares `provider` or the wildcard.
    pub fn supports_provider(&self, provider: &str) -> bool {
        self.providers
            .iter()
            .any(|p| p == provider || p == WILDCARD_PROVIDER)
    }

    /// Rebuild this descriptor from a capability-introspection reply.
    ///
    /// Launch details (executable, args) are kept; everything the plugin
    /// reports about itself replaces the manifest values. A reply that
    /// carries no priority keeps the manifest priority.
    pub fn refreshed(&self, info: &PluginInfo) -> Result<Self, CostplaneError> {
        let version = semver::Version::parse(&info.version).map_err(|e| {
            CostplaneError::Config(format!(
                "plugin {} reported invalid version '{}': {e}",
                self.name, info.version
            ))
        })?;
        Ok(Self {
            name: self.name.clone(),
            version,
            description: self.description.clone(),
            providers: normalize_providers(info.providers.clone()),
            features: info.features,
            default_priority: info.priority.unwrap_or(self.default_priority),
            executable: self.executable.clone(),
            args: self.args.clone(),
        })
    }
}

fn normalize_providers(mut providers: Vec<String>) -> Vec<String> {
    for p in providers.iter_mut() {
        *p = p.trim().to_string();
    }
    providers.retain(|p| !p.is_empty());
    providers.sort();
    providers.dedup();
    providers
}

/// Intermediate TOML deserialization struct for `plugin.toml`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PluginManifestFile {
    plugin: PluginSection,
}

/// The `[plugin]` section of a `plugin.toml` file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PluginSection {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    executable: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    providers: Vec<String>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    priority: u32,
}

/// Parse a plugin manifest from TOML content.
///
/// `base_dir` is the directory holding the manifest; a relative `executable`
/// is resolved against it. Name, version (semver), provider list and feature
/// names are validated.
pub fn parse_plugin_manifest(
    toml_content: &str,
    base_dir: &Path,
) -> Result<PluginDescriptor, CostplaneError> {
    let file: PluginManifestFile = toml::from_str(toml_content)
        .map_err(|e| CostplaneError::Config(format!("invalid plugin manifest: {e}")))?;

    let section = file.plugin;

    if section.name.trim().is_empty() {
        return Err(CostplaneError::Config(
            "plugin manifest: name must not be empty".to_string(),
        ));
    }

    let version = semver::Version::parse(&section.version).map_err(|e| {
        CostplaneError::Config(format!(
            "plugin manifest: invalid version '{}': {e}",
            section.version
        ))
    })?;

    if section.executable.trim().is_empty() {
        return Err(CostplaneError::Config(
            "plugin manifest: executable must not be empty".to_string(),
        ));
    }

    let mut features = FeatureSet::unrestricted();
    for name in &section.features {
        let feature = Feature::from_str(name).map_err(|_| {
            CostplaneError::Config(format!(
                "plugin manifest: unknown feature '{name}'. Expected one of: {}",
                Feature::ALL.map(|f| f.to_string()).join(", ")
            ))
        })?;
        features.insert(feature);
    }

    let executable = {
        let path = PathBuf::from(&section.executable);
        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    };

    Ok(PluginDescriptor {
        name: section.name,
        version,
        description: section.description,
        providers: normalize_providers(section.providers),
        features,
        default_priority: section.priority,
        executable,
        args: section.args,
    })
}
