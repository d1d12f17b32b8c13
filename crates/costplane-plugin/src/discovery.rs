// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk plugin discovery.
//!
//! Plugins are installed as `<plugin_dir>/<name>/<version>/plugin.toml`.
//! When several versions of one plugin are installed, the highest semver
//! version with a valid manifest wins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use costplane_core::CostplaneError;
use tracing::{debug, warn};

use crate::catalog::CapabilityCatalog;
use crate::manifest::{PluginDescriptor, parse_plugin_manifest};

/// File name of a plugin manifest inside a version directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Outcome of scanning a plugin directory.
#[derive(Debug, Default)]
pub struct Discovery {
    pub catalog: CapabilityCatalog,
    /// Manifests that were skipped, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Scan `plugin_dir` and build a catalog of the newest valid plugin versions.
///
/// A missing directory yields an empty catalog. Unreadable or invalid
/// manifests are skipped and reported in [`Discovery::skipped`]; only a
/// failure to list `plugin_dir` itself is an error.
pub fn discover(plugin_dir: &Path) -> Result<Discovery, CostplaneError> {
    let mut discovery = Discovery::default();

    if !plugin_dir.exists() {
        debug!(dir = %plugin_dir.display(), "plugin directory does not exist");
        return Ok(discovery);
    }

    let plugin_dirs = std::fs::read_dir(plugin_dir).map_err(|e| {
        CostplaneError::Config(format!(
            "cannot read plugin directory {}: {e}",
            plugin_dir.display()
        ))
    })?;

    let mut newest: BTreeMap<String, PluginDescriptor> = BTreeMap::new();

    for plugin_entry in plugin_dirs.flatten() {
        let plugin_path = plugin_entry.path();
        if !plugin_path.is_dir() {
            continue;
        }
        let Ok(version_dirs) = std::fs::read_dir(&plugin_path) else {
            continue;
        };
        for version_entry in version_dirs.flatten() {
            let version_path = version_entry.path();
            let manifest_path = version_path.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }
            match load_manifest(&manifest_path, &version_path) {
                Ok(descriptor) => {
                    let keep = newest
                        .get(&descriptor.name)
                        .is_none_or(|current| descriptor.version > current.version);
                    if keep {
                        newest.insert(descriptor.name.clone(), descriptor);
                    }
                }
                Err(reason) => {
                    warn!(manifest = %manifest_path.display(), %reason, "skipping plugin manifest");
                    discovery.skipped.push((manifest_path, reason));
                }
            }
        }
    }

    for descriptor in newest.into_values() {
        debug!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            providers = ?descriptor.providers,
            features = %descriptor.features,
            "discovered plugin"
        );
        discovery.catalog.register(descriptor);
    }

    Ok(discovery)
}

fn load_manifest(manifest_path: &Path, version_dir: &Path) -> Result<PluginDescriptor, String> {
    let content = std::fs::read_to_string(manifest_path).map_err(|e| e.to_string())?;
    let descriptor = parse_plugin_manifest(&content, version_dir).map_err(|e| e.to_string())?;

    let dir_version = version_dir
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_start_matches('v'))
        .and_then(|n| semver::Version::parse(n).ok());
    if let Some(dir_version) = dir_version
        && dir_version != descriptor.version
    {
        return Err(format!(
            "manifest version {} does not match directory version {dir_version}",
            descriptor.version
        ));
    }

    Ok(descriptor)
}
