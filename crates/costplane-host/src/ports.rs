// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback port allocation for TCP-mode plugins.

use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex};

use costplane_core::CostplaneError;
use tracing::debug;

const MAX_ATTEMPTS: usize = 32;

/// Hands out free loopback ports and remembers which are held by live plugins.
///
/// Selection is serialised, so two launches never receive the same port.
#[derive(Debug, Default)]
pub struct PortAllocator {
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve a currently free port. The reservation lasts until the lease drops.
    pub fn allocate(self: &Arc<Self>) -> Result<PortLease, CostplaneError> {
        let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..MAX_ATTEMPTS {
            let port = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
                .and_then(|l| l.local_addr())
                .map_err(|e| CostplaneError::Internal(format!("cannot probe for a free port: {e}")))?
                .port();
            if reserved.insert(port) {
                debug!(port, "reserved plugin port");
                return Ok(PortLease {
                    port,
                    allocator: Arc::clone(self),
                });
            }
        }
        Err(CostplaneError::Internal(format!(
            "no free loopback port after {MAX_ATTEMPTS} attempts"
        )))
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&port)
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn release(&self, port: u16) {
        self.reserved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&port);
        debug!(port, "released plugin port");
    }
}

/// A reserved port, released when dropped.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    allocator: Arc<PortAllocator>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.allocator.release(self.port);
    }
}
