// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `costplane plugins` command implementation.
//!
//! Lists the installed plugins as JSON. With `--introspect`, each plugin is
//! launched and asked for its live capabilities, which replace the manifest
//! values in the listing.

use std::time::Duration;

use costplane_config::model::CostplaneConfig;
use costplane_core::{CostplaneError, FeatureSet};
use costplane_host::PluginHost;
use costplane_plugin::PluginDescriptor;
use serde::Serialize;
use tracing::warn;

use crate::{setup, shutdown};

/// One line of the listing.
#[derive(Debug, Serialize)]
struct PluginRow {
    name: String,
    version: String,
    providers: Vec<String>,
    features: FeatureSet,
    priority: u32,
    executable: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&PluginDescriptor> for PluginRow {
    fn from(d: &PluginDescriptor) -> Self {
        Self {
            name: d.name.clone(),
            version: d.version.to_string(),
            providers: d.providers.clone(),
            features: d.features,
            priority: d.default_priority,
            executable: d.executable.display().to_string(),
            error: None,
        }
    }
}

/// Run the `costplane plugins` command. Returns the process exit code.
pub async fn run_plugins(config: &CostplaneConfig, introspect: bool) -> Result<i32, CostplaneError> {
    let catalog = setup::discover_catalog(config)?;
    let descriptors = catalog.list_all();

    let rows = if introspect {
        let host = PluginHost::from_config(&config.engine);
        let cancel = shutdown::install_signal_handler();
        let mut rows = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            rows.push(match host.introspect(descriptor, &cancel).await {
                Ok(refreshed) => PluginRow::from(&refreshed),
                Err(e) => {
                    warn!(plugin = %descriptor.name, error = %e, "introspection failed");
                    PluginRow {
                        error: Some(e.to_string()),
                        ..PluginRow::from(descriptor)
                    }
                }
            });
        }
        host.shutdown(Duration::from_millis(config.engine.shutdown_grace_ms))
            .await;
        cancel.cancel();
        rows
    } else {
        descriptors.into_iter().map(PluginRow::from).collect()
    };

    let failed = rows.iter().any(|r| r.error.is_some());
    let body = serde_json::to_string_pretty(&rows)
        .map_err(|e| CostplaneError::Internal(format!("failed to encode plugin list: {e}")))?;
    println!("{body}");
    Ok(if failed { 1 } else { 0 })
}
