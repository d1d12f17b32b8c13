// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Starting plugin processes and opening their transport.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use costplane_config::model::LaunchMode;
use costplane_core::CostplaneError;
use costplane_plugin::PluginDescriptor;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::ports::{PortAllocator, PortLease};
use crate::protocol::{ENV_PLUGIN_MODE, ENV_PLUGIN_PORT};

const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// A started plugin: the byte streams to talk over, plus whatever must stay
/// alive with it.
pub struct LaunchedPlugin {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// The subprocess, when there is one.
    pub child: Option<Child>,
    /// Port held for the lifetime of a TCP-mode plugin.
    pub lease: Option<PortLease>,
}

impl LaunchedPlugin {
    /// Wrap an in-process stream pair with no subprocess behind it.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
            lease: None,
        }
    }
}

impl std::fmt::Debug for LaunchedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedPlugin")
            .field("pid", &self.child.as_ref().and_then(Child::id))
            .field("port", &self.lease.as_ref().map(PortLease::port))
            .finish_non_exhaustive()
    }
}

/// Starts plugins. The host calls this once per process slot.
#[async_trait]
pub trait PluginLauncher: Send + Sync {
    /// Start `descriptor` and return a connected stream pair.
    ///
    /// `deadline` bounds how long connecting may take; it does not cover the
    /// readiness probe, which the host runs afterwards.
    async fn launch(
        &self,
        descriptor: &PluginDescriptor,
        deadline: Duration,
    ) -> Result<LaunchedPlugin, CostplaneError>;
}

/// Launches plugins as real subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    mode: LaunchMode,
    ports: Arc<PortAllocator>,
}

impl ProcessLauncher {
    pub fn new(mode: LaunchMode) -> Self {
        Self {
            mode,
            ports: PortAllocator::new(),
        }
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    fn command(&self, descriptor: &PluginDescriptor) -> Command {
        let mut cmd = Command::new(&descriptor.executable);
        cmd.args(&descriptor.args)
            .env(ENV_PLUGIN_MODE, self.mode.to_string())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(
        &self,
        descriptor: &PluginDescriptor,
        mut cmd: Command,
    ) -> Result<Child, CostplaneError> {
        let mut child = cmd.spawn().map_err(|e| CostplaneError::Connection {
            plugin: descriptor.name.clone(),
            message: format!("failed to start {}: {e}", descriptor.executable.display()),
            source: Some(Box::new(e)),
        })?;
        if let Some(stderr) = child.stderr.take() {
            forward_output(descriptor.name.clone(), stderr);
        }
        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            pid = child.id(),
            mode = %self.mode,
            "plugin process started"
        );
        Ok(child)
    }

    async fn launch_stdio(&self, descriptor: &PluginDescriptor) -> Result<LaunchedPlugin, CostplaneError> {
        let mut cmd = self.command(descriptor);
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
        let mut child = self.spawn(descriptor, cmd)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            return Err(CostplaneError::connection(&descriptor.name, "plugin stdio was not captured"));
        };
        Ok(LaunchedPlugin {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
            lease: None,
        })
    }

    async fn launch_tcp(
        &self,
        descriptor: &PluginDescriptor,
        deadline: Duration,
    ) -> Result<LaunchedPlugin, CostplaneError> {
        let lease = self.ports.allocate()?;
        let port = lease.port();

        let mut cmd = self.command(descriptor);
        cmd.arg(format!("--port={port}"))
            .env(ENV_PLUGIN_PORT, port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped());
        let mut child = self.spawn(descriptor, cmd)?;
        if let Some(stdout) = child.stdout.take() {
            forward_output(descriptor.name.clone(), stdout);
        }

        let stream = tokio::time::timeout(deadline, connect_with_retry(&mut child, port))
            .await
            .map_err(|_| {
                CostplaneError::connection(
                    &descriptor.name,
                    format!("plugin did not accept connections on port {port} within {}ms", deadline.as_millis()),
                )
            })?
            .map_err(|message| CostplaneError::connection(&descriptor.name, message))?;
        debug!(plugin = %descriptor.name, port, "connected to plugin");

        let (read, write) = stream.into_split();
        Ok(LaunchedPlugin {
            reader: Box::new(read),
            writer: Box::new(write),
            child: Some(child),
            lease: Some(lease),
        })
    }
}

#[async_trait]
impl PluginLauncher for ProcessLauncher {
    async fn launch(
        &self,
        descriptor: &PluginDescriptor,
        deadline: Duration,
    ) -> Result<LaunchedPlugin, CostplaneError> {
        match self.mode {
            LaunchMode::Stdio => self.launch_stdio(descriptor).await,
            LaunchMode::Tcp => self.launch_tcp(descriptor, deadline).await,
        }
    }
}

async fn connect_with_retry(child: &mut Child, port: u16) -> Result<TcpStream, String> {
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(format!("plugin exited with {status} before accepting connections"));
                }
                debug!(port, error = %e, "plugin not listening yet");
                tokio::time::sleep(CONNECT_RETRY).await;
            }
        }
    }
}

/// Relay a plugin's diagnostic output into our logs.
fn forward_output<R: AsyncRead + Unpin + Send + 'static>(plugin: String, output: R) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(output).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(plugin = %plugin, "{line}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_a_connection_error() {
        let launcher = ProcessLauncher::new(LaunchMode::Stdio);
        let descriptor = PluginDescriptor::new("ghost", semver::Version::new(1, 0, 0))
            .with_executable("/nonexistent/costplane-ghost-plugin");
        let err = launcher
            .launch(&descriptor, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CostplaneError::Connection { ref plugin, .. } if plugin == "ghost"));
    }

    #[tokio::test]
    async fn tcp_launch_failure_releases_port() {
        let launcher = ProcessLauncher::new(LaunchMode::Tcp);
        let descriptor = PluginDescriptor::new("ghost", semver::Version::new(1, 0, 0))
            .with_executable("/nonexistent/costplane-ghost-plugin");
        assert!(launcher.launch(&descriptor, Duration::from_secs(1)).await.is_err());
        assert_eq!(launcher.ports().reserved_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tcp_plugin_that_exits_early_is_reported() {
        let launcher = ProcessLauncher::new(LaunchMode::Tcp);
        let descriptor = PluginDescriptor::new("quitter", semver::Version::new(1, 0, 0))
            .with_executable("/bin/sh")
            .with_args(["-c", "exit 3"]);
        let err = launcher
            .launch(&descriptor, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited"), "{err}");
    }
}
