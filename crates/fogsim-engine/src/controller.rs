//! Per-task orchestration
//!
//! The controller routes every generated task: it asks the active policy
//! whether the source device should offload, assembles the candidate set,
//! performs the transfer, and falls back to local admission when a
//! transfer bounces. A task rejected on both paths is dropped and counted.

use fogsim_core::{FogError, ResourceStatus, Result};
use tracing::debug;

use crate::device::FogDevice;
use crate::iot::IoTDevice;
use crate::net::NetworkModel;
use crate::policy::OffloadPolicy;
use crate::security::SecurityGate;
use crate::task::Task;

/// Borrow two distinct elements of a slice mutably
pub(crate) fn pair_mut<T>(slice: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    assert!(i != j, "pair_mut needs distinct indices");
    if i < j {
        let (head, tail) = slice.split_at_mut(j);
        (&mut head[i], &mut tail[0])
    } else {
        let (head, tail) = slice.split_at_mut(i);
        (&mut tail[0], &mut head[j])
    }
}

/// Offloading controller driving one policy over the fleet
pub struct Controller {
    policy: Box<dyn OffloadPolicy>,
    generated: u64,
    offloaded: u64,
    dropped: u64,
}

impl Controller {
    /// Build a controller and let the policy compute its initial tables
    pub fn new(mut policy: Box<dyn OffloadPolicy>, devices: &[FogDevice]) -> Self {
        policy.update_policy(devices);
        Controller {
            policy,
            generated: 0,
            offloaded: 0,
            dropped: 0,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn offloaded(&self) -> u64 {
        self.offloaded
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Route one freshly generated task from its IoT source.
    ///
    /// Tasks the policy keeps local go to the source device and nowhere
    /// else. Offloaded tasks fall back to local admission once if no
    /// target is chosen or the transfer bounces. After that the task is
    /// dropped.
    pub fn process_task(
        &mut self,
        devices: &mut [FogDevice],
        iot: &IoTDevice,
        task: Task,
        net: &dyn NetworkModel,
        gate: &mut SecurityGate,
    ) -> Result<()> {
        self.generated += 1;

        let src = devices
            .iter()
            .position(|d| d.id() == &iot.fog)
            .ok_or_else(|| FogError::UnknownDevice(iot.fog.clone()))?;

        let mut task = task;

        if !self.policy.should_offload(&devices[src], &task) {
            if devices[src].receive_task(task).is_err() {
                self.dropped += 1;
                debug!(source = %iot.fog, "task dropped: local queue full");
            }
            return Ok(());
        }

        let target = {
            let source = &devices[src];
            let candidates: Vec<&FogDevice> = if self.policy.cell_scoped() {
                devices
                    .iter()
                    .filter(|d| d.cell_id == source.cell_id && d.id() != source.id())
                    .collect()
            } else {
                devices.iter().filter(|d| d.id() != source.id()).collect()
            };
            self.policy
                .select_target(source, &task, &candidates)
                .and_then(|id| devices.iter().position(|d| d.id() == &id))
        };

        if let Some(tgt) = target {
            if tgt != src {
                let (source, target) = pair_mut(devices, src, tgt);
                match source.offload_to(target, task, net, gate) {
                    Ok(()) => {
                        self.offloaded += 1;
                        return Ok(());
                    }
                    Err(bounced) => task = bounced,
                }
            }
        }

        if devices[src].receive_task(task).is_err() {
            self.dropped += 1;
            debug!(source = %iot.fog, "task dropped: rejected everywhere");
        }
        Ok(())
    }

    /// Periodic refresh: recompute policy tables and exchange status
    /// snapshots inside every cell so neighbor caches stay warm.
    pub fn update_status(&mut self, devices: &mut [FogDevice]) {
        self.policy.update_policy(devices);

        let snapshots: Vec<(Option<usize>, ResourceStatus)> = devices
            .iter()
            .map(|d| (d.cell_id, d.snapshot()))
            .collect();

        for i in 0..devices.len() {
            if snapshots[i].0.is_none() {
                continue;
            }
            for j in 0..devices.len() {
                if i == j || snapshots[i].0 != snapshots[j].0 {
                    continue;
                }
                let (sender, receiver) = pair_mut(devices, i, j);
                sender.send_status(receiver, snapshots[i].1.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCaps;
    use crate::net::FlatNetwork;
    use crate::policy::{DynamicPolicy, StaticPolicy};
    use fogsim_core::{DeviceId, Position, TaskId};

    fn device(id: &str, mips: u32, x: f64, cell: usize, max_queue: usize) -> FogDevice {
        let mut d = FogDevice::new(
            DeviceId::new(id),
            Position::new(x, 0.0),
            DeviceCaps {
                total_mips: mips,
                ram: 2048,
                storage: 20_000,
                bandwidth: 500,
                max_queue,
            },
        );
        d.cell_id = Some(cell);
        d
    }

    fn iot(id: &str, fog: &str) -> IoTDevice {
        IoTDevice::new(id, Position::new(0.0, 0.0), DeviceId::new(fog))
    }

    fn task(id: &str, size: u32) -> Task {
        Task::new(TaskId::new(id), "iot-0", size, 10, false, 0)
    }

    #[test]
    fn test_local_admission_when_policy_keeps_task() {
        let mut devices = vec![device("fog-0", 1000, 0.0, 0, 10)];
        let net = FlatNetwork::default();
        let mut gate = SecurityGate::disabled();
        let mut controller = Controller::new(Box::new(StaticPolicy::new()), &devices);

        let src = iot("iot-0", "fog-0");
        controller
            .process_task(&mut devices, &src, task("t-1", 500), &net, &mut gate)
            .unwrap();
        assert_eq!(devices[0].received_tasks(), 1);
        assert_eq!(controller.offloaded(), 0);
        assert_eq!(controller.dropped(), 0);
    }

    #[test]
    fn test_unknown_source_fog_is_fatal() {
        let mut devices = vec![device("fog-0", 1000, 0.0, 0, 10)];
        let net = FlatNetwork::default();
        let mut gate = SecurityGate::disabled();
        let mut controller = Controller::new(Box::new(StaticPolicy::new()), &devices);

        let stray = iot("iot-9", "fog-9");
        let err = controller.process_task(&mut devices, &stray, task("t-1", 100), &net, &mut gate);
        assert!(matches!(err, Err(FogError::UnknownDevice(_))));
    }

    #[test]
    fn test_local_keep_with_full_queue_drops() {
        // the policy keeps the task local; a full queue means a drop, not
        // a detour through the offload path
        let mut devices = vec![
            device("fog-0", 1000, 0.0, 0, 1),
            device("fog-1", 1000, 10.0, 0, 10),
        ];
        let net = FlatNetwork::default();
        let mut gate = SecurityGate::disabled();
        let mut controller = Controller::new(Box::new(StaticPolicy::new()), &devices);

        let src = iot("iot-0", "fog-0");
        for i in 0..2 {
            controller
                .process_task(&mut devices, &src, task(&format!("t-{i}"), 400), &net, &mut gate)
                .unwrap();
        }
        assert_eq!(devices[0].received_tasks(), 1);
        assert_eq!(devices[1].received_tasks(), 0);
        assert_eq!(controller.offloaded(), 0);
        assert_eq!(controller.dropped(), 1);
    }

    #[test]
    fn test_task_dropped_when_rejected_everywhere() {
        let mut devices = vec![
            device("fog-0", 1000, 0.0, 0, 1),
            device("fog-1", 1000, 10.0, 0, 1),
        ];
        let net = FlatNetwork::default();
        let mut gate = SecurityGate::disabled();
        let mut controller = Controller::new(Box::new(StaticPolicy::new()), &devices);

        // drive the source past the offload threshold and fill both queues
        devices[0].receive_task(task("t-busy", 900)).unwrap();
        devices[0].tick(0);
        devices[0].tick(1);
        assert!(devices[0].utilization() > 0.8);
        devices[0].receive_task(task("t-queued", 400)).unwrap();
        devices[1].receive_task(task("t-remote", 400)).unwrap();

        let src = iot("iot-0", "fog-0");
        controller
            .process_task(&mut devices, &src, task("t-late", 400), &net, &mut gate)
            .unwrap();

        // the ring partner bounced it and the local queue is full
        assert_eq!(controller.offloaded(), 0);
        assert_eq!(controller.dropped(), 1);
        assert_eq!(controller.generated(), 1);
    }

    #[test]
    fn test_dynamic_candidates_cross_cells() {
        // the task cannot fit at its source; dynamic may reach the other cell
        let mut devices = vec![
            device("fog-0", 1000, 0.0, 0, 10),
            device("fog-1", 2000, 500.0, 1, 10),
        ];
        let net = FlatNetwork::default();
        let mut gate = SecurityGate::disabled();
        let mut controller = Controller::new(Box::new(DynamicPolicy::new(7)), &devices);

        let src = iot("iot-0", "fog-0");
        controller
            .process_task(&mut devices, &src, task("t-big", 1200), &net, &mut gate)
            .unwrap();
        assert_eq!(devices[1].received_tasks(), 1);
        assert_eq!(controller.offloaded(), 1);
        assert_eq!(controller.dropped(), 0);
    }

    #[test]
    fn test_update_status_fills_neighbor_caches() {
        let mut devices = vec![
            device("fog-0", 1000, 0.0, 0, 10),
            device("fog-1", 1000, 10.0, 0, 10),
            device("fog-2", 1000, 900.0, 1, 10),
        ];
        let mut controller = Controller::new(Box::new(StaticPolicy::new()), &devices);
        controller.update_status(&mut devices);

        // cell mates know each other, the other cell stays unknown
        assert!(devices[0].monitor.neighbor(&DeviceId::new("fog-1")).is_some());
        assert!(devices[1].monitor.neighbor(&DeviceId::new("fog-0")).is_some());
        assert!(devices[0].monitor.neighbor(&DeviceId::new("fog-2")).is_none());
        assert_eq!(devices[2].communicator.messages(), 0);
    }

    #[test]
    fn test_pair_mut_returns_both_orders() {
        let mut values = vec![1, 2, 3];
        let (a, b) = pair_mut(&mut values, 2, 0);
        assert_eq!((*a, *b), (3, 1));
        let (c, d) = pair_mut(&mut values, 0, 2);
        assert_eq!((*c, *d), (1, 3));
    }
}
