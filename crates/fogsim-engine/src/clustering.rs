//! Spatial clustering of fog devices into cells
//!
//! Standard Lloyd's k-means over device positions, seeded for
//! reproducibility. Each non-empty cell elects the device closest to the
//! centroid as its master. Empty cells are allowed and elect no master.

use fogsim_core::{Cell, FogError, Position, Result, Role};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::device::FogDevice;

const MAX_ITERATIONS: usize = 100;
/// Convergence: no centroid moves more than this in either coordinate
const TOLERANCE: f64 = 1e-3;

/// Partition `devices` into `k` cells, stamping `cell_id`, role and
/// `cell_members` on every device. Returns the cell records.
pub fn cluster(devices: &mut [FogDevice], k: usize, seed: u64) -> Result<Vec<Cell>> {
    if devices.is_empty() {
        return Err(FogError::config("cannot cluster an empty fleet"));
    }
    if k == 0 {
        return Err(FogError::config("cell count must be at least 1"));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = initial_centroids(devices, k, &mut rng);
    let mut assignment = vec![0usize; devices.len()];

    let mut iterations = 0;
    for iter in 0..MAX_ITERATIONS {
        iterations = iter + 1;
        for (i, device) in devices.iter().enumerate() {
            assignment[i] = nearest_centroid(device.position(), &centroids);
        }

        let mut moved = false;
        for (ci, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<Position> = devices
                .iter()
                .enumerate()
                .filter(|(i, _)| assignment[*i] == ci)
                .map(|(_, d)| d.position())
                .collect();
            if members.is_empty() {
                continue;
            }
            let new_x = members.iter().map(|p| p.x).sum::<f64>() / members.len() as f64;
            let new_y = members.iter().map(|p| p.y).sum::<f64>() / members.len() as f64;
            if (centroid.x - new_x).abs() > TOLERANCE || (centroid.y - new_y).abs() > TOLERANCE {
                moved = true;
            }
            centroid.x = new_x;
            centroid.y = new_y;
        }
        if !moved {
            break;
        }
    }
    info!(cells = k, iterations, "k-means converged");

    let mut cells = Vec::with_capacity(k);
    for ci in 0..k {
        let member_indices: Vec<usize> = (0..devices.len())
            .filter(|&i| assignment[i] == ci)
            .collect();

        if member_indices.is_empty() {
            cells.push(Cell {
                id: ci,
                centroid: centroids[ci],
                master: None,
                members: Vec::new(),
            });
            continue;
        }

        // master: closest to the centroid, first index wins on a tie
        let mut master_idx = member_indices[0];
        let mut best = devices[master_idx].position().distance_to(centroids[ci]);
        for &i in &member_indices[1..] {
            let d = devices[i].position().distance_to(centroids[ci]);
            if d < best {
                best = d;
                master_idx = i;
            }
        }

        let member_ids: Vec<_> = member_indices
            .iter()
            .map(|&i| devices[i].id().clone())
            .collect();

        for &i in &member_indices {
            devices[i].cell_id = Some(ci);
            devices[i].role = if i == master_idx {
                Role::Master
            } else {
                Role::Member
            };
            devices[i].cell_members = member_ids
                .iter()
                .filter(|id| *id != devices[i].id())
                .cloned()
                .collect();
        }

        cells.push(Cell {
            id: ci,
            centroid: centroids[ci],
            master: Some(devices[master_idx].id().clone()),
            members: member_ids,
        });
    }

    Ok(cells)
}

fn initial_centroids(devices: &[FogDevice], k: usize, rng: &mut StdRng) -> Vec<Position> {
    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for device in devices {
        let p = device.position();
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    (0..k)
        .map(|_| {
            let x = min_x + rng.gen::<f64>() * (max_x - min_x);
            let y = min_y + rng.gen::<f64>() * (max_y - min_y);
            Position::new(x, y)
        })
        .collect()
}

/// Index of the closest centroid; the lowest index wins on equal distance
fn nearest_centroid(position: Position, centroids: &[Position]) -> usize {
    let mut nearest = 0;
    let mut best = f64::MAX;
    for (i, c) in centroids.iter().enumerate() {
        let d = position.distance_to(*c);
        if d < best {
            best = d;
            nearest = i;
        }
    }
    nearest
}
