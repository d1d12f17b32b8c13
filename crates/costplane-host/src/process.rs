// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle of one supervised plugin process.
//!
//! ```text
//! NotStarted -> Launching -> Ready <-> InUse
//!                   |          |         |
//!                   |          +-> Draining -> Terminated
//!                   +--------------------------> Terminated
//! ```
//!
//! Transitions never go backwards. A relaunch uses a fresh `PluginProcess`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use costplane_plugin::PluginKey;
use strum::Display;
use tokio::process::Child;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::ports::PortLease;
use crate::transport::TransportClient;

/// Where a plugin process is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Launching,
    Ready,
    InUse,
    Draining,
    Terminated,
}

impl ProcessState {
    pub fn can_transition(self, to: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, to),
            (NotStarted, Launching)
                | (NotStarted, Terminated)
                | (Launching, Ready)
                | (Launching, Terminated)
                | (Ready, InUse)
                | (InUse, Ready)
                | (Ready, Draining)
                | (InUse, Draining)
                | (Ready, Terminated)
                | (InUse, Terminated)
                | (Draining, Terminated)
        )
    }
}

/// An illegal lifecycle transition was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("plugin process cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: ProcessState,
    pub to: ProcessState,
}

#[derive(Debug)]
struct Status {
    state: ProcessState,
    in_flight: usize,
}

/// One plugin subprocess and its connection.
pub struct PluginProcess {
    key: PluginKey,
    status: Mutex<Status>,
    /// Set once by the launch; concurrent checkouts wait on the same launch.
    connection: OnceCell<Arc<TransportClient>>,
    child: tokio::sync::Mutex<Option<Child>>,
    lease: Mutex<Option<PortLease>>,
}

impl PluginProcess {
    pub fn new(key: PluginKey) -> Self {
        Self {
            key,
            status: Mutex::new(Status {
                state: ProcessState::NotStarted,
                in_flight: 0,
            }),
            connection: OnceCell::new(),
            child: tokio::sync::Mutex::new(None),
            lease: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    pub fn state(&self) -> ProcessState {
        self.status().state
    }

    /// Calls currently holding this process.
    pub fn in_flight(&self) -> usize {
        self.status().in_flight
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.try_lock().ok().and_then(|c| c.as_ref().and_then(Child::id))
    }

    /// Bound loopback port, for TCP-mode plugins.
    pub fn port(&self) -> Option<u16> {
        self.lease
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(PortLease::port)
    }

    pub fn transition(&self, to: ProcessState) -> Result<(), TransitionError> {
        let mut status = self.status();
        Self::apply(&self.key, &mut status, to)
    }

    /// Whether a checkout may still use this process.
    pub fn is_usable(&self) -> bool {
        let state = self.state();
        let open = self.connection.get().is_some_and(|c| !c.is_closed());
        match state {
            ProcessState::NotStarted | ProcessState::Launching => true,
            ProcessState::Ready | ProcessState::InUse => open,
            ProcessState::Draining | ProcessState::Terminated => false,
        }
    }

    pub(crate) fn connection(&self) -> &OnceCell<Arc<TransportClient>> {
        &self.connection
    }

    pub(crate) async fn attach(&self, child: Option<Child>, lease: Option<PortLease>) {
        *self.child.lock().await = child;
        *self.lease.lock().unwrap_or_else(|e| e.into_inner()) = lease;
    }

    /// Take one use of a ready process.
    pub(crate) fn begin_use(&self) -> Result<(), TransitionError> {
        let mut status = self.status();
        match status.state {
            ProcessState::Ready => {
                Self::apply(&self.key, &mut status, ProcessState::InUse)?;
                status.in_flight = 1;
                Ok(())
            }
            ProcessState::InUse => {
                status.in_flight += 1;
                Ok(())
            }
            from => Err(TransitionError {
                from,
                to: ProcessState::InUse,
            }),
        }
    }

    /// Return one use. The last one back moves the process to `Ready`.
    pub(crate) fn end_use(&self) {
        let mut status = self.status();
        status.in_flight = status.in_flight.saturating_sub(1);
        if status.in_flight == 0 && status.state == ProcessState::InUse {
            let _ = Self::apply(&self.key, &mut status, ProcessState::Ready);
        }
    }

    /// Record that the process died under us. Idempotent.
    pub(crate) fn mark_crashed(&self) {
        let mut status = self.status();
        if status.state != ProcessState::Terminated {
            warn!(plugin = %self.key, state = %status.state, "plugin connection lost");
            status.state = ProcessState::Terminated;
        }
    }

    /// Stop the process: SIGTERM, wait up to `grace`, then kill.
    pub(crate) async fn terminate(&self, grace: Duration) {
        {
            let mut status = self.status();
            match status.state {
                ProcessState::Ready | ProcessState::InUse => {
                    let _ = Self::apply(&self.key, &mut status, ProcessState::Draining);
                }
                ProcessState::Terminated => {}
                _ => {
                    let _ = Self::apply(&self.key, &mut status, ProcessState::Terminated);
                }
            }
        }

        if let Some(client) = self.connection.get() {
            client.shutdown().await;
        }

        if let Some(mut child) = self.child.lock().await.take() {
            request_stop(&child);
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => debug!(plugin = %self.key, %status, "plugin exited"),
                Ok(Err(e)) => warn!(plugin = %self.key, error = %e, "failed waiting for plugin"),
                Err(_) => {
                    warn!(plugin = %self.key, grace_ms = grace.as_millis() as u64, "plugin ignored stop request, killing");
                    let _ = child.kill().await;
                }
            }
        }

        self.lease.lock().unwrap_or_else(|e| e.into_inner()).take();
        let mut status = self.status();
        if status.state != ProcessState::Terminated {
            let _ = Self::apply(&self.key, &mut status, ProcessState::Terminated);
        }
        info!(plugin = %self.key, "plugin stopped");
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(key: &PluginKey, status: &mut Status, to: ProcessState) -> Result<(), TransitionError> {
        let from = status.state;
        if !from.can_transition(to) {
            return Err(TransitionError { from, to });
        }
        debug!(plugin = %key, %from, %to, "plugin state change");
        status.state = to;
        Ok(())
    }
}

impl std::fmt::Debug for PluginProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProcess")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn request_stop(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) with a pid we spawned and still own.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_stop(_child: &Child) {}
