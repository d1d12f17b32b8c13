// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin process hosting for Costplane.
//!
//! Plugins run as long-lived subprocesses speaking newline-delimited JSON over
//! stdio or a loopback TCP connection. The [`PluginHost`] launches each plugin
//! on first use, probes it for readiness, multiplexes concurrent calls over
//! one connection and stops every process at shutdown.

pub mod host;
pub mod launcher;
pub mod ports;
pub mod process;
pub mod protocol;
pub mod transport;

pub use host::{PluginConnection, PluginHost};
pub use launcher::{LaunchedPlugin, PluginLauncher, ProcessLauncher};
pub use ports::{PortAllocator, PortLease};
pub use process::{PluginProcess, ProcessState, TransitionError};
pub use protocol::{Method, Request, Response, WireError};
pub use transport::TransportClient;
