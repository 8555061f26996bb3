//! Interfaces to the cluster membership layer.
//!
//! The scheduler does not own cluster membership. It consumes three things
//! from it: the identity of the local node, a resource snapshot used for
//! admission control, and liveness events ([`ClusterEvent`]) fed to the
//! reconciler.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Identifies a cluster node, typically by hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness events reported by the membership layer.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// A node checked in, reporting the set of worker pids alive on it.
    Heartbeat { node: NodeId, live_pids: Vec<u32> },
    /// A node was declared dead; none of its workers survive.
    NodeDown { node: NodeId },
}

/// Local resource snapshot consumed by the dispatcher's admission check.
pub trait NodeResources: Send + Sync {
    /// One-minute CPU load average.
    fn cpu_load(&self) -> f64;
    /// Used memory as a percentage of total (0-100).
    fn memory_usage(&self) -> f64;
}

/// [`NodeResources`] backed by the `sysinfo` crate.
pub struct SystemResources {
    system: Mutex<System>,
}

impl SystemResources {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemResources {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeResources for SystemResources {
    fn cpu_load(&self) -> f64 {
        System::load_average().one
    }

    fn memory_usage(&self) -> f64 {
        let mut system = self.system.lock().expect("sysinfo lock poisoned");
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        system.used_memory() as f64 / total as f64 * 100.0
    }
}

/// Fixed resource figures, for tests and for nodes without readable metrics.
#[derive(Debug, Clone, Copy)]
pub struct StaticResources {
    pub cpu_load: f64,
    pub memory_usage: f64,
}

impl StaticResources {
    pub fn idle() -> Self {
        Self {
            cpu_load: 0.0,
            memory_usage: 0.0,
        }
    }
}

impl NodeResources for StaticResources {
    fn cpu_load(&self) -> f64 {
        self.cpu_load
    }

    fn memory_usage(&self) -> f64 {
        self.memory_usage
    }
}
