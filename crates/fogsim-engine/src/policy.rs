//! Offloading policies
//!
//! Implements the three target-selection strategies the simulator compares:
//! - Static: pre-computed circular offload ring per cell
//! - Dynamic: runtime decisions from current load and distance
//! - Hybrid: static ring inside cells with dynamic fallback and master bias
//!
//! Policies read device state but never mutate it; the only state they own
//! is their table or RNG.

use std::cmp::Ordering;
use std::collections::HashMap;

use fogsim_core::{DeviceId, HIGH_LOAD, LOW_LOAD, MEDIUM_LOAD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::FogDevice;
use crate::task::Task;

/// Offloading policy contract
pub trait OffloadPolicy {
    /// Policy name for reports
    fn name(&self) -> &'static str;

    /// Decide whether this task should leave its source device
    fn should_offload(&mut self, device: &FogDevice, task: &Task) -> bool;

    /// Pick a target among the candidates, or none if nothing suitable
    fn select_target(
        &mut self,
        src: &FogDevice,
        task: &Task,
        candidates: &[&FogDevice],
    ) -> Option<DeviceId>;

    /// Recompute internal tables from the current fleet state
    fn update_policy(&mut self, devices: &[FogDevice]);

    /// Whether the candidate set is restricted to the source's cell.
    /// Dynamic selection ranges over the whole fleet; the others stay
    /// inside the cell.
    fn cell_scoped(&self) -> bool {
        true
    }
}

/// Least-utilized candidate; ties break by device id
fn least_utilized<'a>(candidates: &[&'a FogDevice]) -> Option<&'a FogDevice> {
    candidates.iter().copied().min_by(|a, b| {
        a.utilization()
            .partial_cmp(&b.utilization())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id().cmp(b.id()))
    })
}

/// Closest candidate to `src`; ties break by device id
fn nearest<'a>(src: &FogDevice, candidates: &[&'a FogDevice]) -> Option<&'a FogDevice> {
    candidates.iter().copied().min_by(|a, b| {
        let da = src.position().distance_to(a.position());
        let db = src.position().distance_to(b.position());
        da.partial_cmp(&db)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id().cmp(b.id()))
    })
}

/// Capacity-descending order used to lay out offload rings
fn by_capacity_desc(a: &&FogDevice, b: &&FogDevice) -> Ordering {
    b.total_mips()
        .cmp(&a.total_mips())
        .then_with(|| a.id().cmp(b.id()))
}

/// Group devices by cell, skipping unclustered ones
fn devices_by_cell<'a>(devices: &'a [FogDevice]) -> HashMap<usize, Vec<&'a FogDevice>> {
    let mut by_cell: HashMap<usize, Vec<&FogDevice>> = HashMap::new();
    for device in devices {
        if let Some(cell) = device.cell_id {
            by_cell.entry(cell).or_default().push(device);
        }
    }
    by_cell
}

/// Static offloading (SoA): each device forwards to a fixed ring partner
/// computed from per-cell capacity order.
#[derive(Debug, Default)]
pub struct StaticPolicy {
    ring: HashMap<DeviceId, DeviceId>,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-registered ring partner of a device, if any
    pub fn partner_of(&self, id: &DeviceId) -> Option<&DeviceId> {
        self.ring.get(id)
    }
}

impl OffloadPolicy for StaticPolicy {
    fn name(&self) -> &'static str {
        "static"
    }

    fn should_offload(&mut self, device: &FogDevice, _task: &Task) -> bool {
        device.utilization() > HIGH_LOAD
    }

    fn select_target(
        &mut self,
        src: &FogDevice,
        task: &Task,
        candidates: &[&FogDevice],
    ) -> Option<DeviceId> {
        if let Some(partner) = self.ring.get(src.id()) {
            if let Some(target) = candidates.iter().find(|d| d.id() == partner) {
                if target.has_resources_for(task) {
                    return Some(partner.clone());
                }
            }
        }
        least_utilized(candidates).map(|d| d.id().clone())
    }

    fn update_policy(&mut self, devices: &[FogDevice]) {
        self.ring.clear();
        for (_, mut members) in devices_by_cell(devices) {
            if members.len() <= 1 {
                continue;
            }
            members.sort_by(by_capacity_desc);
            for (i, member) in members.iter().enumerate() {
                let partner = members[(i + 1) % members.len()];
                self.ring.insert(member.id().clone(), partner.id().clone());
            }
        }
    }
}

/// Dynamic offloading (PoA): decisions from the current utilization
/// distribution, cell-agnostic.
#[derive(Debug)]
pub struct DynamicPolicy {
    rng: StdRng,
}

impl DynamicPolicy {
    pub fn new(seed: u64) -> Self {
        DynamicPolicy {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for DynamicPolicy {
    fn default() -> Self {
        Self::new(42)
    }
}

impl OffloadPolicy for DynamicPolicy {
    fn name(&self) -> &'static str {
        "dynamic"
    }

    fn should_offload(&mut self, device: &FogDevice, task: &Task) -> bool {
        let load = device.utilization();
        if load > HIGH_LOAD {
            return true;
        }
        if !device.has_resources_for(task) {
            return true;
        }
        if !task.urgent && load > LOW_LOAD {
            // moderately loaded: shed non-urgent work most of the time
            return self.rng.gen_bool(0.7);
        }
        false
    }

    fn select_target(
        &mut self,
        src: &FogDevice,
        task: &Task,
        candidates: &[&FogDevice],
    ) -> Option<DeviceId> {
        let viable: Vec<&FogDevice> = candidates
            .iter()
            .copied()
            .filter(|d| {
                d.id() != src.id() && d.has_resources_for(task) && d.utilization() < HIGH_LOAD
            })
            .collect();

        let choice = if task.urgent {
            nearest(src, &viable)
        } else {
            least_utilized(&viable)
        };
        choice.map(|d| d.id().clone())
    }

    fn update_policy(&mut self, _devices: &[FogDevice]) {
        // stateless: decisions are made from live state
    }

    fn cell_scoped(&self) -> bool {
        false
    }
}

/// Hybrid offloading: per-cell static tables with a master-aware layout,
/// dynamic scoring as fallback, and a bias that keeps masters working
/// locally until they are highly loaded.
#[derive(Debug, Default)]
pub struct HybridPolicy {
    tables: HashMap<usize, HashMap<DeviceId, DeviceId>>,
}

impl HybridPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The static offload table computed for a cell, if any
    pub fn table_for(&self, cell: usize) -> Option<&HashMap<DeviceId, DeviceId>> {
        self.tables.get(&cell)
    }

    /// Weighted blend of normalized utilization and distance; lowest score
    /// wins, ties by id. Distance dominates for urgent tasks.
    fn select_weighted(
        &self,
        src: &FogDevice,
        task: &Task,
        candidates: &[&FogDevice],
    ) -> Option<DeviceId> {
        let weight_load = if task.urgent { 0.3 } else { 0.7 };

        candidates
            .iter()
            .copied()
            .filter(|d| d.id() != src.id() && d.has_resources_for(task))
            .min_by(|a, b| {
                let score = |d: &FogDevice| {
                    let distance = src.position().distance_to(d.position()) / 1000.0;
                    weight_load * d.utilization() + (1.0 - weight_load) * distance
                };
                score(a)
                    .partial_cmp(&score(b))
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id().cmp(b.id()))
            })
            .map(|d| d.id().clone())
    }

    /// Master-aware static table for one cell: master feeds the most
    /// capable member, members chain by descending capacity, and the last
    /// member closes the loop back to the master.
    fn cell_table(members: &[&FogDevice]) -> HashMap<DeviceId, DeviceId> {
        let mut table = HashMap::new();
        if members.len() <= 1 {
            return table;
        }

        let master = members.iter().copied().find(|d| d.is_master());
        match master {
            None => {
                let mut ring: Vec<&FogDevice> = members.to_vec();
                ring.sort_by(by_capacity_desc);
                for (i, member) in ring.iter().enumerate() {
                    let partner = ring[(i + 1) % ring.len()];
                    table.insert(member.id().clone(), partner.id().clone());
                }
            }
            Some(master) => {
                let mut rest: Vec<&FogDevice> = members
                    .iter()
                    .copied()
                    .filter(|d| d.id() != master.id())
                    .collect();
                rest.sort_by(by_capacity_desc);

                table.insert(master.id().clone(), rest[0].id().clone());
                for pair in rest.windows(2) {
                    table.insert(pair[0].id().clone(), pair[1].id().clone());
                }
                if let Some(last) = rest.last() {
                    table.insert(last.id().clone(), master.id().clone());
                }
            }
        }
        table
    }
}

impl OffloadPolicy for HybridPolicy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn should_offload(&mut self, device: &FogDevice, task: &Task) -> bool {
        let load = device.utilization();

        // masters retain work until highly loaded
        if device.is_master() && load < HIGH_LOAD {
            return false;
        }
        // urgent tasks stay local when they fit
        if task.urgent && device.has_resources_for(task) {
            return false;
        }
        if !task.urgent && load > MEDIUM_LOAD {
            return true;
        }
        !device.has_resources_for(task)
    }

    fn select_target(
        &mut self,
        src: &FogDevice,
        task: &Task,
        candidates: &[&FogDevice],
    ) -> Option<DeviceId> {
        let cell_mates: Vec<&FogDevice> = candidates
            .iter()
            .copied()
            .filter(|d| d.cell_id == src.cell_id)
            .collect();

        if task.urgent {
            return self.select_weighted(src, task, &cell_mates);
        }

        if let Some(partner) = src
            .cell_id
            .and_then(|cell| self.tables.get(&cell))
            .and_then(|table| table.get(src.id()))
        {
            if let Some(target) = cell_mates.iter().find(|d| d.id() == partner) {
                if target.has_resources_for(task) {
                    return Some(partner.clone());
                }
            }
        }
        self.select_weighted(src, task, &cell_mates)
    }

    fn update_policy(&mut self, devices: &[FogDevice]) {
        self.tables.clear();
        for (cell, members) in devices_by_cell(devices) {
            self.tables.insert(cell, Self::cell_table(&members));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCaps;
    use fogsim_core::{Position, Role, TaskId};

    fn device(id: &str, mips: u32, x: f64, cell: usize) -> FogDevice {
        let mut d = FogDevice::new(
            DeviceId::new(id),
            Position::new(x, 0.0),
            DeviceCaps {
                total_mips: mips,
                ram: 2048,
                storage: 20_000,
                bandwidth: 500,
                max_queue: 10,
            },
        );
        d.cell_id = Some(cell);
        d
    }

    fn task(size: u32, urgent: bool) -> Task {
        Task::new(TaskId::new("t-1"), "iot-0", size, 10, urgent, 0)
    }

    /// Drive a device's utilization to roughly `target` by executing filler
    fn load_device(d: &mut FogDevice, mips: u32) {
        d.receive_task(Task::new(
            TaskId::new("t-fill"),
            "iot-fill",
            mips,
            1000,
            false,
            0,
        ))
        .unwrap();
        d.tick(0);
        d.tick(1);
        assert!(d.scheduler.executing_count() > 0);
    }

    #[test]
    fn test_static_ring_covers_cell_by_capacity() {
        let devices = vec![
            device("fog-0", 4000, 0.0, 0),
            device("fog-1", 6000, 10.0, 0),
            device("fog-2", 5000, 20.0, 0),
        ];
        let mut policy = StaticPolicy::new();
        policy.update_policy(&devices);

        // ring order is capacity-descending: fog-1 -> fog-2 -> fog-0 -> fog-1
        assert_eq!(policy.ring[&DeviceId::new("fog-1")], DeviceId::new("fog-2"));
        assert_eq!(policy.ring[&DeviceId::new("fog-2")], DeviceId::new("fog-0"));
        assert_eq!(policy.ring[&DeviceId::new("fog-0")], DeviceId::new("fog-1"));
    }

    #[test]
    fn test_static_skips_single_device_cells() {
        let devices = vec![device("fog-0", 4000, 0.0, 0), device("fog-1", 4000, 10.0, 1)];
        let mut policy = StaticPolicy::new();
        policy.update_policy(&devices);
        assert!(policy.ring.is_empty());
    }

    #[test]
    fn test_static_offloads_only_when_highly_loaded() {
        let mut d = device("fog-0", 1000, 0.0, 0);
        let mut policy = StaticPolicy::new();
        assert!(!policy.should_offload(&d, &task(100, false)));

        load_device(&mut d, 900); // 0.9 utilization
        assert!(policy.should_offload(&d, &task(100, false)));
    }

    #[test]
    fn test_static_falls_back_to_least_utilized() {
        let mut devices = vec![
            device("fog-0", 1000, 0.0, 0),
            device("fog-1", 1000, 10.0, 0),
            device("fog-2", 1000, 20.0, 0),
        ];
        let mut policy = StaticPolicy::new();
        policy.update_policy(&devices);

        // fog-0's partner is fog-1 (capacity ties broken by id); exhaust it
        load_device(&mut devices[1], 1000);
        let src = &devices[0];
        let candidates: Vec<&FogDevice> = devices[1..].iter().collect();
        let target = policy.select_target(src, &task(500, false), &candidates);
        assert_eq!(target, Some(DeviceId::new("fog-2")));
    }

    #[test]
    fn test_dynamic_offloads_oversized_task() {
        let d = device("fog-0", 1000, 0.0, 0);
        let mut policy = DynamicPolicy::new(7);
        // idle device, but the task cannot fit at all
        assert!(policy.should_offload(&d, &task(1500, false)));
        assert!(!policy.should_offload(&d, &task(500, true)));
    }

    #[test]
    fn test_dynamic_moderate_load_sheds_probabilistically() {
        let mut d = device("fog-0", 1000, 0.0, 0);
        load_device(&mut d, 500); // utilization 0.5
        let mut policy = DynamicPolicy::new(7);

        let offloads = (0..200)
            .filter(|_| policy.should_offload(&d, &task(100, false)))
            .count();
        // Bernoulli(0.7) over 200 draws
        assert!((100..=180).contains(&offloads), "got {offloads}");
    }

    #[test]
    fn test_dynamic_urgent_picks_nearest() {
        let near = device("fog-1", 1000, 50.0, 0);
        let far = device("fog-2", 1000, 500.0, 1);
        let src = device("fog-0", 1000, 0.0, 0);
        let mut policy = DynamicPolicy::new(7);

        let candidates = vec![&near, &far];
        let target = policy.select_target(&src, &task(500, true), &candidates);
        assert_eq!(target, Some(DeviceId::new("fog-1")));
    }

    #[test]
    fn test_dynamic_normal_picks_least_utilized() {
        let mut busy = device("fog-1", 1000, 10.0, 0);
        load_device(&mut busy, 600);
        let idle = device("fog-2", 1000, 900.0, 1);
        let src = device("fog-0", 1000, 0.0, 0);
        let mut policy = DynamicPolicy::new(7);

        let candidates = vec![&busy, &idle];
        let target = policy.select_target(&src, &task(300, false), &candidates);
        assert_eq!(target, Some(DeviceId::new("fog-2")));
    }

    #[test]
    fn test_dynamic_excludes_overloaded_candidates() {
        let mut maxed = device("fog-1", 1000, 10.0, 0);
        load_device(&mut maxed, 900);
        let src = device("fog-0", 1000, 0.0, 0);
        let mut policy = DynamicPolicy::new(7);

        let candidates = vec![&maxed];
        assert_eq!(policy.select_target(&src, &task(50, false), &candidates), None);
    }

    #[test]
    fn test_hybrid_master_keeps_work_local() {
        let mut master = device("fog-0", 1000, 0.0, 0);
        master.role = Role::Master;
        let mut policy = HybridPolicy::new();

        load_device(&mut master, 600);
        assert!(!policy.should_offload(&master, &task(100, false)));

        let mut member = device("fog-1", 1000, 0.0, 0);
        load_device(&mut member, 600);
        assert!(policy.should_offload(&member, &task(100, false)));
    }

    #[test]
    fn test_hybrid_table_is_master_structured() {
        let mut m0 = device("fog-0", 3000, 0.0, 0);
        m0.role = Role::Master;
        let devices = vec![
            m0,
            device("fog-1", 6000, 10.0, 0),
            device("fog-2", 4000, 20.0, 0),
        ];
        let mut policy = HybridPolicy::new();
        policy.update_policy(&devices);
        let table = &policy.tables[&0];

        // master feeds the most capable member; last member closes the loop
        assert_eq!(table[&DeviceId::new("fog-0")], DeviceId::new("fog-1"));
        assert_eq!(table[&DeviceId::new("fog-1")], DeviceId::new("fog-2"));
        assert_eq!(table[&DeviceId::new("fog-2")], DeviceId::new("fog-0"));
    }

    #[test]
    fn test_hybrid_restricts_targets_to_cell() {
        let src = device("fog-0", 1000, 0.0, 0);
        let same_cell = device("fog-1", 1000, 800.0, 0);
        let other_cell = device("fog-2", 1000, 5.0, 1);
        let mut policy = HybridPolicy::new();
        policy.update_policy(&[]);

        let candidates = vec![&same_cell, &other_cell];
        let target = policy.select_target(&src, &task(500, true), &candidates);
        // the nearer device is in another cell and must not be chosen
        assert_eq!(target, Some(DeviceId::new("fog-1")));
    }

    #[test]
    fn test_hybrid_urgent_weighting_prefers_proximity() {
        let mut near_busy = device("fog-1", 1000, 100.0, 0);
        load_device(&mut near_busy, 500);
        let far_idle = device("fog-2", 1000, 900.0, 0);
        let src = device("fog-0", 1000, 0.0, 0);
        let mut policy = HybridPolicy::new();
        policy.update_policy(&[]);

        let candidates = vec![&near_busy, &far_idle];
        // urgent: distance dominates -> near device despite its load
        let urgent = policy.select_target(&src, &task(300, true), &candidates);
        assert_eq!(urgent, Some(DeviceId::new("fog-1")));
        // non-urgent: load dominates -> idle device despite the distance
        let normal = policy.select_target(&src, &task(300, false), &candidates);
        assert_eq!(normal, Some(DeviceId::new("fog-2")));
    }
}
