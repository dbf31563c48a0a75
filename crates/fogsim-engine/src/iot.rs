//! IoT task sources

use fogsim_core::{DeviceId, Position};

/// An IoT device bound to its nearest fog device at build time
#[derive(Debug, Clone)]
pub struct IoTDevice {
    pub id: String,
    pub position: Position,
    /// The fog device all of this source's tasks enter the system through
    pub fog: DeviceId,
}

impl IoTDevice {
    pub fn new(id: impl Into<String>, position: Position, fog: DeviceId) -> Self {
        IoTDevice {
            id: id.into(),
            position,
            fog,
        }
    }
}
