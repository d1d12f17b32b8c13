// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Costplane integration tests.
//!
//! Provides scripted plugins and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without real pricing backends.
//!
//! # Components
//!
//! - [`MockPlugin`] - Plugin speaking the wire protocol with a scripted behavior
//! - [`MockLauncher`] - `PluginLauncher` serving mock plugins over in-memory pipes
//! - [`TestHarness`] - Catalog, router, host and engine wired around mock plugins

pub mod harness;
pub mod launcher;
pub mod mock_plugin;

pub use harness::{TestHarness, TestHarnessBuilder, descriptor};
pub use launcher::MockLauncher;
pub use mock_plugin::{MockBehavior, MockPlugin};
