//! Simulation configuration and the discrete-step driver
//!
//! Single-threaded cooperative ticking: every tick runs the generation
//! phase, then the per-device phase in stable device order, then the
//! periodic controller refresh. All randomness comes from explicit seeded
//! streams, so a run is a pure function of its configuration.

use fogsim_core::{Cell, FogError, Result, Role, TaskId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::clustering;
use crate::controller::Controller;
use crate::device::FogDevice;
use crate::iot::IoTDevice;
use crate::metrics::{self, PolicyReport};
use crate::net::FlatNetwork;
use crate::policy::OffloadPolicy;
use crate::security::SecurityGate;
use crate::task::Task;
use crate::topology;

/// One RNG stream per subsystem; reference values keep runs comparable
/// with the published experiments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seeds {
    pub topology: u64,
    pub placement: u64,
    pub traffic: u64,
    pub clustering: u64,
    pub policy: u64,
}

impl Default for Seeds {
    fn default() -> Self {
        Seeds {
            topology: 42,
            placement: 24,
            traffic: 33,
            clustering: 42,
            policy: 42,
        }
    }
}

impl Seeds {
    /// Derive all streams deterministically from one base seed
    pub fn from_base(seed: u64) -> Self {
        Seeds {
            topology: seed,
            placement: seed.wrapping_add(1),
            traffic: seed.wrapping_add(2),
            clustering: seed,
            policy: seed.wrapping_add(3),
        }
    }
}

/// Parameters of one simulation run
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub fog_count: usize,
    pub iot_count: usize,
    pub cells: usize,
    pub ticks: u64,

    /// Per-IoT-device task generation probability per tick
    pub gen_probability: f64,
    pub urgent_probability: f64,
    /// Task size band in MI, inclusive
    pub size_range: (u32, u32),
    /// Deadline band in ticks, inclusive
    pub deadline_range: (i32, i32),

    pub max_queue: usize,
    /// Controller refresh cadence in ticks
    pub refresh_interval: u64,
    pub seeds: Seeds,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            fog_count: 10,
            iot_count: 20,
            cells: 2,
            ticks: 60,
            gen_probability: 0.2,
            urgent_probability: 0.2,
            size_range: (300, 2000),
            deadline_range: (5, 25),
            max_queue: 100,
            refresh_interval: 10,
            seeds: Seeds::default(),
        }
    }
}

impl SimConfig {
    /// Reject configurations the simulator cannot run meaningfully
    pub fn validate(&self) -> Result<()> {
        if self.fog_count == 0 {
            return Err(FogError::config("fog device count must be positive"));
        }
        if self.cells == 0 {
            return Err(FogError::config("cell count must be positive"));
        }
        if self.cells as f64 > self.fog_count as f64 / 3.0 {
            return Err(FogError::config(format!(
                "{} cells is too many for {} fog devices (need at least 3 devices per cell)",
                self.cells, self.fog_count
            )));
        }
        if self.ticks == 0 {
            return Err(FogError::config("tick count must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gen_probability) {
            return Err(FogError::config("generation probability must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.urgent_probability) {
            return Err(FogError::config("urgency probability must be in [0, 1]"));
        }
        if self.size_range.0 == 0 || self.size_range.0 > self.size_range.1 {
            return Err(FogError::config("task size range is empty"));
        }
        if self.deadline_range.0 <= 0 || self.deadline_range.0 > self.deadline_range.1 {
            return Err(FogError::config("deadline range is empty"));
        }
        if self.max_queue == 0 {
            return Err(FogError::config("queue capacity must be positive"));
        }
        if self.refresh_interval == 0 {
            return Err(FogError::config("refresh interval must be positive"));
        }
        Ok(())
    }

    /// Short label identifying the run shape in reports
    pub fn label(&self) -> String {
        format!(
            "fog:{} cells:{} iot:{} ticks:{}",
            self.fog_count, self.cells, self.iot_count, self.ticks
        )
    }
}

/// A built topology ready to run policies
pub struct Simulation {
    config: SimConfig,
    devices: Vec<FogDevice>,
    iots: Vec<IoTDevice>,
    cells: Vec<Cell>,
    network: FlatNetwork,
    security: SecurityGate,
}

impl Simulation {
    /// Validate the configuration, build the fleet and cluster it
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut devices =
            topology::build_fog_fleet(config.fog_count, config.max_queue, config.seeds.topology);
        let cells = clustering::cluster(&mut devices, config.cells, config.seeds.clustering)?;
        let iots = topology::build_iot_fleet(config.iot_count, config.seeds.placement, &devices)?;
        info!(
            fog = devices.len(),
            iot = iots.len(),
            cells = cells.iter().filter(|c| !c.is_empty()).count(),
            "topology built"
        );
        Ok(Simulation {
            config,
            devices,
            iots,
            cells,
            network: FlatNetwork::default(),
            security: SecurityGate::default(),
        })
    }

    /// Assemble a simulation from a hand-built topology. Devices must
    /// already carry their cell assignment; cell records are derived.
    pub fn from_parts(
        config: SimConfig,
        devices: Vec<FogDevice>,
        iots: Vec<IoTDevice>,
    ) -> Result<Self> {
        if devices.is_empty() {
            return Err(FogError::config("fleet must not be empty"));
        }
        let cells = derive_cells(&devices);
        Ok(Simulation {
            config,
            devices,
            iots,
            cells,
            network: FlatNetwork::default(),
            security: SecurityGate::default(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn devices(&self) -> &[FogDevice] {
        &self.devices
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Disable the authentication handshake (and its latency overhead)
    pub fn without_security(mut self) -> Self {
        self.security = SecurityGate::disabled();
        self
    }

    /// Run one policy over T ticks and report its metrics.
    ///
    /// Devices are reset first, so several policies can be compared on the
    /// same topology.
    pub fn run(&mut self, policy: Box<dyn OffloadPolicy>) -> Result<PolicyReport> {
        for device in &mut self.devices {
            device.reset();
        }

        let mut controller = Controller::new(policy, &self.devices);
        let mut traffic = StdRng::seed_from_u64(self.config.seeds.traffic);
        info!(policy = controller.policy_name(), "simulation started");

        for tick in 0..self.config.ticks {
            // generation phase
            for iot in &self.iots {
                if !traffic.gen_bool(self.config.gen_probability) {
                    continue;
                }
                let size = traffic.gen_range(self.config.size_range.0..=self.config.size_range.1);
                let deadline =
                    traffic.gen_range(self.config.deadline_range.0..=self.config.deadline_range.1);
                let urgent = traffic.gen_bool(self.config.urgent_probability);
                let task = Task::new(
                    TaskId::new(format!("task-{}-{tick}", iot.id)),
                    iot.id.clone(),
                    size,
                    deadline,
                    urgent,
                    tick,
                );
                controller.process_task(
                    &mut self.devices,
                    iot,
                    task,
                    &self.network,
                    &mut self.security,
                )?;
            }

            // per-device phase, stable order
            for device in &mut self.devices {
                device.tick(tick);
            }

            // periodic refresh
            if tick % self.config.refresh_interval == 0 {
                controller.update_status(&mut self.devices);
            }
        }

        let end = self.config.ticks;
        for device in &mut self.devices {
            device.force_complete_all(end);
        }

        let report = metrics::collect(&self.config.label(), &self.devices, &controller);
        info!(
            policy = report.policy.as_str(),
            completed = report.completed,
            dropped = report.dropped,
            "simulation finished"
        );
        Ok(report)
    }
}

/// Reconstruct cell records from device assignments (used for hand-built
/// topologies)
fn derive_cells(devices: &[FogDevice]) -> Vec<Cell> {
    let mut ids: Vec<usize> = devices.iter().filter_map(|d| d.cell_id).collect();
    ids.sort_unstable();
    ids.dedup();

    ids.into_iter()
        .map(|cell_id| {
            let members: Vec<_> = devices
                .iter()
                .filter(|d| d.cell_id == Some(cell_id))
                .collect();
            let centroid_x =
                members.iter().map(|d| d.position().x).sum::<f64>() / members.len() as f64;
            let centroid_y =
                members.iter().map(|d| d.position().y).sum::<f64>() / members.len() as f64;
            Cell {
                id: cell_id,
                centroid: fogsim_core::Position::new(centroid_x, centroid_y),
                master: members
                    .iter()
                    .find(|d| d.role == Role::Master)
                    .map(|d| d.id().clone()),
                members: members.iter().map(|d| d.id().clone()).collect(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::StaticPolicy;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_too_many_cells_rejected() {
        let config = SimConfig {
            fog_count: 10,
            cells: 4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FogError::Config(_))));
    }

    #[test]
    fn test_zero_devices_rejected() {
        let config = SimConfig {
            fog_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let config = SimConfig {
            gen_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_conserves_tasks() {
        let config = SimConfig {
            ticks: 40,
            ..Default::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        let report = sim.run(Box::new(StaticPolicy::new())).unwrap();

        assert_eq!(
            report.generated,
            report.completed + report.failed + report.dropped + report.still_in_flight
        );
    }

    #[test]
    fn test_seed_rebasing_changes_topology() {
        let a = Simulation::new(SimConfig::default()).unwrap();
        let b = Simulation::new(SimConfig {
            seeds: Seeds::from_base(7),
            ..Default::default()
        })
        .unwrap();
        assert!(a
            .devices()
            .iter()
            .zip(b.devices())
            .any(|(x, y)| x.position() != y.position()));
    }
}
