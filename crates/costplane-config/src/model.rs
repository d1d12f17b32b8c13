// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Costplane engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Top-level Costplane configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostplaneConfig {
    /// Worker pool, timeouts and plugin launch settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Log verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Plugin routing overrides.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Retryable/terminal status code overrides.
    #[serde(default)]
    pub classification: ClassificationConfig,
}

/// How the host talks to a launched plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LaunchMode {
    /// Requests over the child's stdin/stdout.
    #[default]
    Stdio,
    /// Requests over a loopback TCP connection to a host-allocated port.
    Tcp,
}

/// Engine runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on resources processed concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Deadline applied to each remote call, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Deadline for the readiness probe of a freshly launched plugin.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Grace period between SIGTERM and force-kill at shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Transport used to reach plugins.
    #[serde(default)]
    pub launch_mode: LaunchMode,

    /// Directory scanned for installed plugins (`<dir>/<name>/<version>/plugin.toml`).
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            call_timeout_ms: default_call_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            launch_mode: LaunchMode::default(),
            plugin_dir: default_plugin_dir(),
        }
    }
}

fn default_max_workers() -> usize {
    8
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_plugin_dir() -> String {
    dirs::home_dir()
        .map(|p| p.join(".costplane").join("plugins"))
        .unwrap_or_else(|| std::path::PathBuf::from(".costplane/plugins"))
        .to_string_lossy()
        .to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Plugin routing configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// One entry per plugin override, from `[[routing.plugins]]`.
    #[serde(default)]
    pub plugins: Vec<RoutingEntry>,
}

/// One `[[routing.plugins]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingEntry {
    /// Name of the plugin this entry targets.
    pub name: String,

    /// Feature names this entry applies to. Empty means every feature the
    /// plugin declares. Names are checked against the known feature list by
    /// the routing validator, not here.
    #[serde(default)]
    pub features: Vec<String>,

    /// Resource-type patterns that route to this plugin ahead of
    /// provider-based routing.
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,

    /// Priority; higher runs first. `0` joins the first tier executed.
    /// Unset falls back to the plugin's declared default priority.
    #[serde(default)]
    pub priority: Option<u32>,

    /// Whether a retryable failure of this plugin advances to the next tier.
    #[serde(default = "default_fallback")]
    pub fallback: bool,
}

fn default_fallback() -> bool {
    true
}

/// Pattern syntax tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PatternType {
    Glob,
    Regex,
}

/// A resource-type pattern with an explicit syntax tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PatternConfig {
    #[serde(rename = "type")]
    pub kind: PatternType,
    pub pattern: String,
}

impl PatternConfig {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternType::Glob,
            pattern: pattern.into(),
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternType::Regex,
            pattern: pattern.into(),
        }
    }
}

/// Overrides for how plugin status codes are classified.
///
/// Codes are wire names such as `UNAVAILABLE`. Codes not listed keep their
/// built-in classification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationConfig {
    /// Codes that allow advancing to the next candidate.
    #[serde(default)]
    pub retryable: Vec<String>,

    /// Codes that stop the query's candidate walk.
    #[serde(default)]
    pub terminal: Vec<String>,
}
