// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine testing.
//!
//! `TestHarness` assembles catalog, router, host and engine around mock
//! plugins served in-process. Provides `estimate()` to drive one query
//! through routing, launch, call and merge.

use std::sync::Arc;
use std::time::Duration;

use costplane_core::{CostplaneError, FeatureSet, ResourceQuery};
use costplane_engine::{Engine, MergedResult};
use costplane_host::PluginHost;
use costplane_plugin::{CapabilityCatalog, PluginDescriptor};
use costplane_router::{RoutingEngine, RoutingRule};
use tokio_util::sync::CancellationToken;

use crate::launcher::MockLauncher;
use crate::mock_plugin::{MockBehavior, MockPlugin};

/// Descriptor for a mock plugin at version 1.0.0.
pub fn descriptor(name: &str, providers: &[&str], priority: u32) -> PluginDescriptor {
    PluginDescriptor::new(name, semver::Version::new(1, 0, 0))
        .with_providers(providers.iter().copied())
        .with_features(FeatureSet::unrestricted())
        .with_priority(priority)
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    descriptors: Vec<PluginDescriptor>,
    plugins: Vec<MockPlugin>,
    rules: Vec<RoutingRule>,
    call_timeout: Duration,
    probe_timeout: Duration,
    launch_delay: Duration,
    deadline: Duration,
    max_workers: usize,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            plugins: Vec::new(),
            rules: Vec::new(),
            call_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(1),
            launch_delay: Duration::ZERO,
            deadline: Duration::from_secs(30),
            max_workers: 4,
        }
    }

    /// Install a plugin and serve it with `behavior`.
    pub fn with_plugin(mut self, descriptor: PluginDescriptor, behavior: MockBehavior) -> Self {
        self.plugins.push(MockPlugin::new(descriptor.name.clone(), behavior));
        self.descriptors.push(descriptor);
        self
    }

    /// Install a catalog entry with no mock behind it; launching it fails.
    pub fn with_unlaunchable(mut self, descriptor: PluginDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn with_rule(mut self, rule: RoutingRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Make every plugin launch take `delay`.
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// Overall per-query deadline used by [`TestHarness::estimate`].
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Build the harness. Invalid rule patterns are a configuration error.
    pub fn build(self) -> Result<TestHarness, CostplaneError> {
        let catalog: CapabilityCatalog = self.descriptors.into_iter().collect();
        let (router, pattern_errors) = RoutingEngine::new(Arc::new(catalog), &self.rules);
        if let Some(first) = pattern_errors.first() {
            return Err(CostplaneError::Config(first.to_string()));
        }

        let launcher = Arc::new(MockLauncher::new().with_launch_delay(self.launch_delay));
        for plugin in self.plugins {
            launcher.add(plugin);
        }
        let host = Arc::new(PluginHost::new(
            Arc::clone(&launcher) as Arc<dyn costplane_host::PluginLauncher>,
            self.probe_timeout,
        ));
        let engine = Engine::new(Arc::new(router), Arc::clone(&host))
            .with_call_timeout(self.call_timeout)
            .with_max_workers(self.max_workers);

        Ok(TestHarness {
            engine: Arc::new(engine),
            host,
            launcher,
            deadline: self.deadline,
        })
    }
}

/// A complete engine wired to mock plugins.
pub struct TestHarness {
    pub engine: Arc<Engine>,
    pub host: Arc<PluginHost>,
    pub launcher: Arc<MockLauncher>,
    deadline: Duration,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Run one query with the default deadline and no cancellation.
    pub async fn estimate(&self, query: &ResourceQuery) -> MergedResult {
        self.engine
            .execute(query, self.deadline, &CancellationToken::new())
            .await
    }

    /// Run many queries with the default deadline and no cancellation.
    pub async fn estimate_batch(&self, queries: &[ResourceQuery]) -> Vec<MergedResult> {
        self.engine
            .execute_batch(queries, self.deadline, &CancellationToken::new())
            .await
    }

    /// Cost operations received by the named plugin.
    pub fn calls(&self, plugin: &str) -> usize {
        self.launcher.plugin(plugin).map_or(0, |p| p.calls())
    }

    pub fn launches(&self, plugin: &str) -> usize {
        self.launcher.launches(plugin)
    }

    /// Stop every plugin the host launched.
    pub async fn shutdown(&self) {
        self.host.shutdown(Duration::from_millis(100)).await;
    }
}
