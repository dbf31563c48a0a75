//! Resource monitoring
//!
//! Each fog device keeps a cache of the last status snapshot received from
//! every cell neighbor. Snapshots are plain values; stale entries are
//! acceptable and simply reflect the last exchange.

use std::collections::HashMap;

use fogsim_core::{DeviceId, ResourceStatus};

/// Neighbor-status cache owned by a fog device
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    neighbors: HashMap<DeviceId, ResourceStatus>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest snapshot received from a neighbor
    pub fn update_neighbor(&mut self, status: ResourceStatus) {
        self.neighbors.insert(status.device.clone(), status);
    }

    /// Last known status of a specific neighbor
    pub fn neighbor(&self, id: &DeviceId) -> Option<&ResourceStatus> {
        self.neighbors.get(id)
    }

    /// All cached neighbor snapshots
    pub fn neighbors(&self) -> &HashMap<DeviceId, ResourceStatus> {
        &self.neighbors
    }

    pub fn clear(&mut self) {
        self.neighbors.clear();
    }
}
