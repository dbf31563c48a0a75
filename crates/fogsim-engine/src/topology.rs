//! Seeded topology builders
//!
//! Generates the heterogeneous fog fleet and the IoT sources. Every draw
//! comes from the stream seeded for this subsystem so a topology is fully
//! reproducible from its seed.

use fogsim_core::{DeviceId, FogError, Position, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{DeviceCaps, FogDevice};
use crate::iot::IoTDevice;

/// Side length of the square deployment field
pub const FIELD_SIZE: f64 = 1000.0;

/// Build `count` fog devices with heterogeneous capacities scattered over
/// the deployment field
pub fn build_fog_fleet(count: usize, max_queue: usize, seed: u64) -> Vec<FogDevice> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let caps = DeviceCaps {
                total_mips: rng.gen_range(3000..7000),
                ram: rng.gen_range(1024..4096),
                storage: rng.gen_range(10_000..50_000),
                bandwidth: rng.gen_range(100..1000),
                max_queue,
            };
            let x = rng.gen_range(0.0..FIELD_SIZE);
            let y = rng.gen_range(0.0..FIELD_SIZE);
            FogDevice::new(DeviceId::new(format!("fog-{i}")), Position::new(x, y), caps)
        })
        .collect()
}

/// Build `count` IoT devices, each bound to its nearest fog device
pub fn build_iot_fleet(count: usize, seed: u64, fogs: &[FogDevice]) -> Result<Vec<IoTDevice>> {
    if fogs.is_empty() {
        return Err(FogError::config("cannot place IoT devices without fog devices"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..count)
        .map(|i| {
            let position = Position::new(
                rng.gen_range(0.0..FIELD_SIZE),
                rng.gen_range(0.0..FIELD_SIZE),
            );
            let fog = nearest_fog(position, fogs);
            IoTDevice::new(format!("iot-{i}"), position, fog)
        })
        .collect())
}

fn nearest_fog(position: Position, fogs: &[FogDevice]) -> DeviceId {
    let mut nearest = fogs[0].id().clone();
    let mut best = position.distance_to(fogs[0].position());
    for fog in &fogs[1..] {
        let d = position.distance_to(fog.position());
        if d < best {
            best = d;
            nearest = fog.id().clone();
        }
    }
    nearest
}
