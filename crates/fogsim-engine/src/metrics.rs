//! Per-policy result aggregation

use serde::{Deserialize, Serialize};

use crate::controller::Controller;
use crate::device::FogDevice;

/// Per-device breakdown carried alongside the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device: String,
    pub total_mips: u32,
    pub completed: u64,
    pub failed: u64,
    pub mean_utilization: f64,
    pub energy_j: f64,
    pub messages: u64,
}

/// Summary record for one policy run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyReport {
    pub policy: String,
    pub config: String,

    pub generated: u64,
    pub completed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub still_in_flight: u64,

    pub completion_rate: f64,
    /// Capacity-weighted mean utilization over the whole run
    pub utilization: f64,
    /// Load balance as 1 - stddev of per-device utilization
    pub load_balance_stddev: f64,
    /// Load balance as 1 - (max - min) / max of per-device utilization
    pub load_balance_spread: f64,
    pub avg_response_ms: f64,
    pub total_energy_j: f64,
    pub energy_per_task_j: f64,
    pub offload_rate: f64,
    pub messages: u64,

    pub devices: Vec<DeviceReport>,
}

/// Roll up device and controller state into the policy summary
pub fn collect(config: &str, devices: &[FogDevice], controller: &Controller) -> PolicyReport {
    let generated = controller.generated();
    let completed: u64 = devices.iter().map(|d| d.scheduler.completed_tasks()).sum();
    let failed: u64 = devices.iter().map(|d| d.scheduler.failed_tasks()).sum();
    let still_in_flight: u64 = devices.iter().map(|d| d.scheduler.flushed_in_flight()).sum();
    let dropped = controller.dropped();

    let utilizations: Vec<f64> = devices.iter().map(|d| d.mean_utilization()).collect();

    let capacity: f64 = devices.iter().map(|d| d.total_mips() as f64).sum();
    let utilization = if capacity > 0.0 {
        devices
            .iter()
            .map(|d| d.mean_utilization() * d.total_mips() as f64)
            .sum::<f64>()
            / capacity
    } else {
        0.0
    };

    let finished: u64 = completed + still_in_flight;
    let total_response: f64 = devices.iter().map(|d| d.scheduler.total_response_ms()).sum();
    let avg_response_ms = if finished > 0 {
        total_response / finished as f64
    } else {
        0.0
    };

    let total_energy_j: f64 = devices.iter().map(|d| d.energy.total_j()).sum();
    let energy_per_task_j = if completed > 0 {
        total_energy_j / completed as f64
    } else {
        0.0
    };

    PolicyReport {
        policy: controller.policy_name().to_string(),
        config: config.to_string(),
        generated,
        completed,
        failed,
        dropped,
        still_in_flight,
        completion_rate: rate(completed, generated),
        utilization,
        load_balance_stddev: load_balance_stddev(&utilizations),
        load_balance_spread: load_balance_spread(&utilizations),
        avg_response_ms,
        total_energy_j,
        energy_per_task_j,
        offload_rate: rate(controller.offloaded(), generated),
        messages: devices.iter().map(|d| d.communicator.messages()).sum(),
        devices: devices
            .iter()
            .map(|d| DeviceReport {
                device: d.id().to_string(),
                total_mips: d.total_mips(),
                completed: d.scheduler.completed_tasks(),
                failed: d.scheduler.failed_tasks(),
                mean_utilization: d.mean_utilization(),
                energy_j: d.energy.total_j(),
                messages: d.communicator.messages(),
            })
            .collect(),
    }
}

fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// 1 - stddev(utilization): 1.0 is perfect balance
pub fn load_balance_stddev(utilizations: &[f64]) -> f64 {
    if utilizations.is_empty() {
        return 1.0;
    }
    let mean = utilizations.iter().sum::<f64>() / utilizations.len() as f64;
    let variance = utilizations
        .iter()
        .map(|u| (u - mean).powi(2))
        .sum::<f64>()
        / utilizations.len() as f64;
    (1.0 - variance.sqrt()).max(0.0)
}

/// 1 - (max - min) / max: 1.0 when every device carries the same load
pub fn load_balance_spread(utilizations: &[f64]) -> f64 {
    let max = utilizations.iter().cloned().fold(f64::MIN, f64::max);
    let min = utilizations.iter().cloned().fold(f64::MAX, f64::min);
    if utilizations.is_empty() || max <= 0.0 {
        1.0
    } else {
        1.0 - (max - min) / max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_balance_perfectly_even() {
        let utils = [0.5, 0.5, 0.5];
        assert_eq!(load_balance_stddev(&utils), 1.0);
        assert_eq!(load_balance_spread(&utils), 1.0);
    }

    #[test]
    fn test_load_balance_skewed() {
        let utils = [0.9, 0.1];
        // stddev = 0.4, spread = (0.9 - 0.1) / 0.9
        assert!((load_balance_stddev(&utils) - 0.6).abs() < 1e-9);
        assert!((load_balance_spread(&utils) - (1.0 - 0.8 / 0.9)).abs() < 1e-9);
    }

    #[test]
    fn test_load_balance_idle_fleet() {
        let utils = [0.0, 0.0];
        assert_eq!(load_balance_stddev(&utils), 1.0);
        assert_eq!(load_balance_spread(&utils), 1.0);
    }
}
