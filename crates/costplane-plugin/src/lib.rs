// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin descriptors, manifest parsing, discovery and the capability catalog.
//!
//! Every installed plugin is described by a `plugin.toml` manifest. Discovery
//! turns the newest valid manifest of each plugin into a `PluginDescriptor`
//! and registers it in the `CapabilityCatalog`, which the router consults to
//! find the plugins that price a given provider.

pub mod catalog;
pub mod discovery;
pub mod manifest;

pub use catalog::CapabilityCatalog;
pub use discovery::{Discovery, MANIFEST_FILE, discover};
pub use manifest::{PluginDescriptor, PluginKey, parse_plugin_manifest};
