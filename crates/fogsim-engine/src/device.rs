//! Fog device: resource accounting plus its monitor, communicator,
//! scheduler and energy meter
//!
//! The device exclusively owns its submodules; none of them holds a
//! reference back. The scheduler works against the `ResourcePool` the
//! device passes into each tick.

use fogsim_core::{DeviceId, LoadLevel, Position, ResourceStatus, Role};

use crate::comm::Communicator;
use crate::energy::{EnergyMeter, PowerState};
use crate::monitor::Monitor;
use crate::net::NetworkModel;
use crate::scheduler::Scheduler;
use crate::security::SecurityGate;
use crate::task::Task;

/// Static capacities of a fog device
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    pub total_mips: u32,
    pub ram: u32,
    pub storage: u32,
    pub bandwidth: u32,
    pub max_queue: usize,
}

/// MIPS ledger for one device. Only the owning device's scheduler mutates
/// it; over- or under-release is a programmer error and fails fast.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    total_mips: u32,
    available_mips: u32,
}

impl ResourcePool {
    pub fn new(total_mips: u32) -> Self {
        assert!(total_mips > 0, "device capacity must be positive");
        ResourcePool {
            total_mips,
            available_mips: total_mips,
        }
    }

    pub fn total_mips(&self) -> u32 {
        self.total_mips
    }

    pub fn available_mips(&self) -> u32 {
        self.available_mips
    }

    pub fn allocate(&mut self, mips: u32) {
        assert!(
            mips <= self.available_mips,
            "allocation of {mips} MIPS exceeds available {}",
            self.available_mips
        );
        self.available_mips -= mips;
    }

    pub fn release(&mut self, mips: u32) {
        assert!(
            self.available_mips + mips <= self.total_mips,
            "release of {mips} MIPS exceeds total {}",
            self.total_mips
        );
        self.available_mips += mips;
    }

    /// Allocated fraction of capacity, in [0, 1]
    pub fn utilization(&self) -> f64 {
        (self.total_mips - self.available_mips) as f64 / self.total_mips as f64
    }

    pub fn reset(&mut self) {
        self.available_mips = self.total_mips;
    }
}

/// A fog node in the simulated deployment
#[derive(Debug)]
pub struct FogDevice {
    id: DeviceId,
    position: Position,
    ram: u32,
    storage: u32,
    bandwidth: u32,

    pool: ResourcePool,
    pub cell_id: Option<usize>,
    pub role: Role,
    /// Ids of the other devices in the same cell, filled in by clustering
    pub cell_members: Vec<DeviceId>,

    pub monitor: Monitor,
    pub communicator: Communicator,
    pub scheduler: Scheduler,
    pub energy: EnergyMeter,

    received_tasks: u64,
    util_accum: f64,
    ticks_observed: u64,
}

impl FogDevice {
    pub fn new(id: DeviceId, position: Position, caps: DeviceCaps) -> Self {
        FogDevice {
            communicator: Communicator::new(id.clone(), position),
            pool: ResourcePool::new(caps.total_mips),
            scheduler: Scheduler::new(caps.max_queue),
            monitor: Monitor::new(),
            energy: EnergyMeter::default(),
            id,
            position,
            ram: caps.ram,
            storage: caps.storage,
            bandwidth: caps.bandwidth,
            cell_id: None,
            role: Role::Member,
            cell_members: Vec::new(),
            received_tasks: 0,
            util_accum: 0.0,
            ticks_observed: 0,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn total_mips(&self) -> u32 {
        self.pool.total_mips()
    }

    pub fn available_mips(&self) -> u32 {
        self.pool.available_mips()
    }

    pub fn utilization(&self) -> f64 {
        self.pool.utilization()
    }

    pub fn is_master(&self) -> bool {
        self.role == Role::Master
    }

    /// Whether the device could dispatch this task right now
    pub fn has_resources_for(&self, task: &Task) -> bool {
        task.size <= self.pool.available_mips()
    }

    /// Whether the admission queue has room
    pub fn can_accept(&self) -> bool {
        self.scheduler.can_accept()
    }

    pub fn received_tasks(&self) -> u64 {
        self.received_tasks
    }

    /// Admission verdict: queue the task or hand it back.
    pub fn receive_task(&mut self, mut task: Task) -> Result<(), Task> {
        if task.origin_fog.is_none() {
            task.origin_fog = Some(self.id.clone());
        }
        self.scheduler.admit(task).map(|()| {
            self.received_tasks += 1;
        })
    }

    /// Offload a task to another device through this device's communicator.
    /// The rejected task travels back in the `Err` variant.
    pub fn offload_to(
        &mut self,
        target: &mut FogDevice,
        task: Task,
        net: &dyn NetworkModel,
        gate: &mut SecurityGate,
    ) -> Result<(), Task> {
        let tx = self.communicator.offload_task(target, task, net, gate)?;
        self.energy.charge(PowerState::Transmit, tx.energy_j);
        Ok(())
    }

    /// Push this device's status snapshot into a neighbor's monitor
    pub fn send_status(&mut self, target: &mut FogDevice, status: ResourceStatus) {
        self.communicator.send_status(target, status);
    }

    /// Current resource snapshot
    pub fn snapshot(&self) -> ResourceStatus {
        let utilization = self.pool.utilization();
        ResourceStatus {
            device: self.id.clone(),
            cpu_utilization: utilization,
            available_ram: self.ram,
            available_storage: self.storage,
            available_bandwidth: self.bandwidth as f64,
            load: LoadLevel::from_utilization(utilization),
        }
    }

    /// Advance one simulation step
    pub fn tick(&mut self, now: u64) {
        self.scheduler.tick(&mut self.pool, now);

        let state = if self.scheduler.executing_count() > 0 {
            PowerState::Processing
        } else {
            PowerState::Idle
        };
        self.energy.consume(state, 1.0);

        self.util_accum += self.pool.utilization();
        self.ticks_observed += 1;
    }

    /// Flush all in-flight work at end of run
    pub fn force_complete_all(&mut self, now: u64) {
        self.scheduler.force_complete_all(&mut self.pool, now);
    }

    /// Utilization averaged over all observed ticks
    pub fn mean_utilization(&self) -> f64 {
        if self.ticks_observed == 0 {
            0.0
        } else {
            self.util_accum / self.ticks_observed as f64
        }
    }

    /// Restore the device for the next policy run on the same topology.
    /// Cell assignment survives; queues, counters and meters do not.
    pub fn reset(&mut self) {
        self.pool.reset();
        self.scheduler.reset();
        self.monitor.clear();
        self.communicator.reset();
        self.energy.reset();
        self.received_tasks = 0;
        self.util_accum = 0.0;
        self.ticks_observed = 0;
    }

}
