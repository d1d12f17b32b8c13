// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin host: owns the process table and hands out connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use costplane_config::model::EngineConfig;
use costplane_core::{CostplaneError, PluginInfo};
use costplane_plugin::{PluginDescriptor, PluginKey};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::launcher::{PluginLauncher, ProcessLauncher};
use crate::process::{PluginProcess, ProcessState};
use crate::protocol::{Method, NameReply};
use crate::transport::TransportClient;

/// Launches plugins on demand and keeps them running for reuse.
///
/// The process table is the only mutable state shared between queries.
/// Lookups take the read lock; the write lock is held only to insert a fresh
/// slot or drop a dead one.
pub struct PluginHost {
    launcher: Arc<dyn PluginLauncher>,
    processes: RwLock<HashMap<PluginKey, Arc<PluginProcess>>>,
    probe_timeout: Duration,
}

impl PluginHost {
    pub fn new(launcher: Arc<dyn PluginLauncher>, probe_timeout: Duration) -> Self {
        Self {
            launcher,
            processes: RwLock::new(HashMap::new()),
            probe_timeout,
        }
    }

    /// Host launching real subprocesses in the configured mode.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(ProcessLauncher::new(config.launch_mode)),
            Duration::from_millis(config.probe_timeout_ms),
        )
    }

    /// Get a ready connection to `descriptor`, launching it if needed.
    ///
    /// A process whose connection has died is replaced by a fresh launch.
    pub async fn checkout(&self, descriptor: &PluginDescriptor) -> Result<PluginConnection, CostplaneError> {
        let key = descriptor.key();
        let process = self.slot(&key).await;

        let client = match process.connection().get() {
            Some(client) => Arc::clone(client),
            None => match self.start(&process, descriptor).await {
                Ok(client) => client,
                Err(e) => {
                    self.evict(&process).await;
                    return Err(e);
                }
            },
        };

        if client.is_closed() {
            process.mark_crashed();
            self.evict(&process).await;
            return Err(CostplaneError::connection(&descriptor.name, "plugin connection closed"));
        }

        process.begin_use().map_err(|e| {
            CostplaneError::connection(&descriptor.name, format!("plugin unavailable: {e}"))
        })?;

        Ok(PluginConnection {
            name: descriptor.name.clone(),
            process,
            client,
        })
    }

    /// Ask a plugin to describe itself and return the refreshed descriptor.
    pub async fn introspect(
        &self,
        descriptor: &PluginDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PluginDescriptor, CostplaneError> {
        let conn = self.checkout(descriptor).await?;
        let reply = conn
            .call(Method::GetPluginInfo, serde_json::Value::Null, self.probe_timeout, cancel)
            .await?;
        let info: PluginInfo = serde_json::from_value(reply).map_err(|e| {
            CostplaneError::protocol(
                &descriptor.name,
                costplane_core::ProtocolErrorKind::Malformed,
                format!("invalid plugin info: {e}"),
            )
        })?;
        let refreshed = descriptor.refreshed(&info)?;
        debug!(
            plugin = %refreshed.name,
            version = %refreshed.version,
            providers = ?refreshed.providers,
            features = %refreshed.features,
            "refreshed plugin capabilities"
        );
        Ok(refreshed)
    }

    /// State of the process currently in the table for `key`.
    pub async fn process_state(&self, key: &PluginKey) -> Option<ProcessState> {
        self.processes.read().await.get(key).map(|p| p.state())
    }

    /// The process currently in the table for `key`.
    pub async fn process(&self, key: &PluginKey) -> Option<Arc<PluginProcess>> {
        self.processes.read().await.get(key).cloned()
    }

    /// Number of processes in the table.
    pub async fn len(&self) -> usize {
        self.processes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.processes.read().await.is_empty()
    }

    /// Stop every process, giving each `grace` to exit before it is killed.
    pub async fn shutdown(&self, grace: Duration) {
        let processes: Vec<Arc<PluginProcess>> = {
            let mut table = self.processes.write().await;
            table.drain().map(|(_, p)| p).collect()
        };
        if processes.is_empty() {
            debug!("no plugin processes to stop");
            return;
        }
        info!(count = processes.len(), "stopping plugin processes");
        futures::future::join_all(processes.iter().map(|p| p.terminate(grace))).await;
    }

    async fn slot(&self, key: &PluginKey) -> Arc<PluginProcess> {
        if let Some(process) = self.processes.read().await.get(key)
            && process.is_usable()
        {
            return Arc::clone(process);
        }

        let mut table = self.processes.write().await;
        if let Some(process) = table.get(key) {
            if process.is_usable() {
                return Arc::clone(process);
            }
            debug!(plugin = %key, state = %process.state(), "replacing dead plugin process");
        }
        let process = Arc::new(PluginProcess::new(key.clone()));
        table.insert(key.clone(), Arc::clone(&process));
        process
    }

    /// Drop `process` from the table unless it was already replaced.
    async fn evict(&self, process: &Arc<PluginProcess>) {
        let mut table = self.processes.write().await;
        if table
            .get(process.key())
            .is_some_and(|current| Arc::ptr_eq(current, process))
        {
            table.remove(process.key());
        }
    }

    /// Launch `process` on its own task, or wait for the launch already
    /// running there.
    ///
    /// A caller that stops waiting (deadline, cancellation) does not abandon
    /// the launch: it runs to `Ready` or `Terminated`, and later checkouts
    /// see the result.
    async fn start(
        &self,
        process: &Arc<PluginProcess>,
        descriptor: &PluginDescriptor,
    ) -> Result<Arc<TransportClient>, CostplaneError> {
        let launch = Launch {
            launcher: Arc::clone(&self.launcher),
            probe_timeout: self.probe_timeout,
            process: Arc::clone(process),
            descriptor: descriptor.clone(),
        };
        tokio::spawn(launch.run())
            .await
            .map_err(|e| CostplaneError::Internal(format!("plugin launch task failed: {e}")))?
    }
}

/// One launch of one process slot, owned by its task.
struct Launch {
    launcher: Arc<dyn PluginLauncher>,
    probe_timeout: Duration,
    process: Arc<PluginProcess>,
    descriptor: PluginDescriptor,
}

impl Launch {
    async fn run(self) -> Result<Arc<TransportClient>, CostplaneError> {
        self.process
            .connection()
            .get_or_try_init(|| self.launch())
            .await
            .map(Arc::clone)
    }

    async fn launch(&self) -> Result<Arc<TransportClient>, CostplaneError> {
        let process = &self.process;
        let descriptor = &self.descriptor;
        process.transition(ProcessState::Launching).map_err(|e| {
            CostplaneError::connection(&descriptor.name, format!("plugin unavailable: {e}"))
        })?;

        let launched = match self.launcher.launch(descriptor, self.probe_timeout).await {
            Ok(launched) => launched,
            Err(e) => {
                warn!(plugin = %descriptor.key(), error = %e, "plugin launch failed");
                let _ = process.transition(ProcessState::Terminated);
                return Err(e);
            }
        };

        let client = Arc::new(TransportClient::connect(
            descriptor.name.clone(),
            launched.reader,
            launched.writer,
        ));
        process.attach(launched.child, launched.lease).await;

        let probe = client
            .call(
                Method::Name,
                serde_json::Value::Null,
                self.probe_timeout,
                &CancellationToken::new(),
            )
            .await;
        let reply = match probe {
            Ok(reply) => reply,
            Err(e) => {
                warn!(plugin = %descriptor.key(), error = %e, "plugin readiness probe failed");
                process.terminate(Duration::ZERO).await;
                return Err(CostplaneError::Connection {
                    plugin: descriptor.name.clone(),
                    message: format!("readiness probe failed: {e}"),
                    source: Some(Box::new(e)),
                });
            }
        };

        if let Ok(NameReply { name }) = serde_json::from_value::<NameReply>(reply)
            && name != descriptor.name
        {
            warn!(plugin = %descriptor.name, reported = %name, "plugin reports a different name");
        }

        // Shutdown may have stopped the slot while the probe was in flight.
        if let Err(e) = process.transition(ProcessState::Ready) {
            process.terminate(Duration::ZERO).await;
            return Err(CostplaneError::connection(
                &descriptor.name,
                format!("plugin stopped while starting: {e}"),
            ));
        }
        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            pid = process.pid(),
            port = process.port(),
            "plugin ready"
        );
        Ok(client)
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("probe_timeout", &self.probe_timeout)
            .finish_non_exhaustive()
    }
}

/// A checked-out plugin. The process stays `InUse` until every connection
/// to it is dropped.
#[derive(Debug)]
pub struct PluginConnection {
    name: String,
    process: Arc<PluginProcess>,
    client: Arc<TransportClient>,
}

impl PluginConnection {
    pub fn plugin(&self) -> &str {
        &self.name
    }

    pub fn process(&self) -> &Arc<PluginProcess> {
        &self.process
    }

    /// Call the plugin. A call that finds the connection dead marks the
    /// process terminated so the next checkout relaunches it.
    pub async fn call(
        &self,
        method: Method,
        params: serde_json::Value,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, CostplaneError> {
        let result = self.client.call(method, params, deadline, cancel).await;
        if self.client.is_closed() {
            self.process.mark_crashed();
        }
        result
    }
}

impl Drop for PluginConnection {
    fn drop(&mut self) {
        self.process.end_use();
    }
}
