// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory plugin launcher.
//!
//! `MockLauncher` implements `PluginLauncher` by serving a registered
//! [`MockPlugin`] over a `tokio::io::duplex` pipe, so the full host stack
//! (probe, transport, process table) runs without spawning subprocesses.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use costplane_core::CostplaneError;
use costplane_host::{LaunchedPlugin, PluginLauncher};
use costplane_plugin::PluginDescriptor;

use crate::mock_plugin::MockPlugin;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Serves mock plugins by name and counts launches.
#[derive(Debug, Default)]
pub struct MockLauncher {
    plugins: Mutex<HashMap<String, MockPlugin>>,
    launches: Mutex<HashMap<String, usize>>,
    launch_delay: Duration,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch takes `delay` before the plugin is connected.
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Register (or replace) the plugin served for its name.
    pub fn add(&self, plugin: MockPlugin) {
        self.plugins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(plugin.name().to_string(), plugin);
    }

    /// Handle to the registered plugin, sharing its call counter.
    pub fn plugin(&self, name: &str) -> Option<MockPlugin> {
        self.plugins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// How many times `name` has been launched.
    pub fn launches(&self, name: &str) -> usize {
        self.launches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_launches(&self) -> usize {
        self.launches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

#[async_trait]
impl PluginLauncher for MockLauncher {
    async fn launch(
        &self,
        descriptor: &PluginDescriptor,
        _deadline: Duration,
    ) -> Result<LaunchedPlugin, CostplaneError> {
        *self
            .launches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(descriptor.name.clone())
            .or_default() += 1;

        let plugin = self.plugin(&descriptor.name).ok_or_else(|| {
            CostplaneError::connection(&descriptor.name, "no mock plugin registered under this name")
        })?;

        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }

        let (host_side, plugin_side) = tokio::io::duplex(PIPE_CAPACITY);
        let (read, write) = tokio::io::split(plugin_side);
        tokio::spawn(plugin.serve(read, write));

        let (read, write) = tokio::io::split(host_side);
        Ok(LaunchedPlugin::from_streams(read, write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_plugin::MockBehavior;

    #[tokio::test]
    async fn unknown_plugin_fails_to_launch() {
        let launcher = MockLauncher::new();
        let d = PluginDescriptor::new("ghost", semver::Version::new(1, 0, 0));
        let err = launcher.launch(&d, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CostplaneError::Connection { .. }));
        assert_eq!(launcher.launches("ghost"), 1);
    }

    #[tokio::test]
    async fn launches_are_counted_per_plugin() {
        let launcher = MockLauncher::new();
        launcher.add(MockPlugin::new("a", MockBehavior::Zero));
        launcher.add(MockPlugin::new("b", MockBehavior::Zero));
        for name in ["a", "a", "b"] {
            let d = PluginDescriptor::new(name, semver::Version::new(1, 0, 0));
            launcher.launch(&d, Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(launcher.launches("a"), 2);
        assert_eq!(launcher.launches("b"), 1);
        assert_eq!(launcher.total_launches(), 3);
    }
}
