// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup shared by every subcommand: config, tracing, catalog, engine.

use std::path::Path;
use std::sync::Arc;

use costplane_config::model::CostplaneConfig;
use costplane_config::ConfigError;
use costplane_core::CostplaneError;
use costplane_engine::Engine;
use costplane_host::PluginHost;
use costplane_plugin::CapabilityCatalog;
use costplane_router::RoutingEngine;
use tracing::{info, warn};

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "COSTPLANE_LOG";

pub fn load_config(path: Option<&Path>) -> Result<CostplaneConfig, Vec<ConfigError>> {
    match path {
        Some(path) => costplane_config::load_and_validate_path(path),
        None => costplane_config::load_and_validate(),
    }
}

/// Log to stderr; stdout carries command output.
///
/// `COSTPLANE_LOG` wins over `RUST_LOG`, which wins over the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn default_directive(log_level: &str) -> String {
    format!("costplane={log_level},warn")
}

/// Scan the configured plugin directory.
pub fn discover_catalog(config: &CostplaneConfig) -> Result<CapabilityCatalog, CostplaneError> {
    let dir = Path::new(&config.engine.plugin_dir);
    let discovery = costplane_plugin::discover(dir)?;
    for (manifest, reason) in &discovery.skipped {
        warn!(manifest = %manifest.display(), %reason, "plugin manifest skipped");
    }
    info!(
        dir = %dir.display(),
        plugins = discovery.catalog.len(),
        "plugin discovery complete"
    );
    Ok(discovery.catalog)
}

/// Router, host and engine for `catalog`.
///
/// Routing entries that do not resolve are dropped with a warning so that
/// the remaining configuration keeps working; `costplane validate` reports
/// them as errors.
pub fn build_engine(config: &CostplaneConfig, catalog: CapabilityCatalog) -> (Engine, Arc<PluginHost>) {
    let (router, errors) = RoutingEngine::from_config(Arc::new(catalog), &config.routing);
    for error in &errors {
        warn!(error = %error, "ignoring routing entry");
    }
    let host = Arc::new(PluginHost::from_config(&config.engine));
    let engine = Engine::from_config(config, Arc::new(router), Arc::clone(&host));
    (engine, host)
}
