// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./costplane.toml` > `~/.config/costplane/costplane.toml` >
//! `/etc/costplane/costplane.toml` with environment variable overrides via `COSTPLANE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CostplaneConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/costplane/costplane.toml` (system-wide)
/// 3. `~/.config/costplane/costplane.toml` (user XDG config)
/// 4. `./costplane.toml` (local directory)
/// 5. `COSTPLANE_*` environment variables
pub fn load_config() -> Result<CostplaneConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CostplaneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CostplaneConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CostplaneConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CostplaneConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CostplaneConfig::default()))
        .merge(Toml::file("/etc/costplane/costplane.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("costplane/costplane.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("costplane.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `COSTPLANE_ENGINE_MAX_WORKERS` must map to `engine.max_workers`,
/// not `engine.max.workers`. Routing entries are arrays and come from files only.
fn env_provider() -> Env {
    Env::prefixed("COSTPLANE_")
        .ignore(&["log"])
        .map(|key| {
            let key_str = key.as_str();
            let mapped = key_str
                .replacen("engine_", "engine.", 1)
                .replacen("logging_", "logging.", 1);
            mapped.into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LaunchMode;

    #[test]
    fn empty_string_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.engine.max_workers, 8);
        assert_eq!(config.engine.launch_mode, LaunchMode::Stdio);
        assert!(config.routing.plugins.is_empty());
    }

    #[test]
    fn env_overrides_engine_section() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("costplane.toml", "[engine]\nmax_workers = 2\n")?;
            jail.set_env("COSTPLANE_ENGINE_MAX_WORKERS", "5");
            jail.set_env("COSTPLANE_LOGGING_LEVEL", "debug");
            let config = load_config_from_path(Path::new("costplane.toml"))?;
            assert_eq!(config.engine.max_workers, 5);
            assert_eq!(config.logging.level, "debug");
            Ok(())
        });
    }
}
