//! Network adapter
//!
//! The core simulator only needs latency and transmit energy for a point to
//! point transfer; real wireless physics (protocol tables, packet loss,
//! interference) stays behind this seam.

/// Outcome of a simulated transmission
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub success: bool,
    pub latency_ms: f64,
    pub energy_j: f64,
    pub reason: &'static str,
}

/// Pluggable transmission model consulted on every task transfer
pub trait NetworkModel {
    fn simulate_transmission(&self, bytes: u64, distance: f64) -> Transmission;
}

/// Distance-linear latency model: every transfer succeeds and costs
/// `base + factor * distance` milliseconds.
#[derive(Debug, Clone)]
pub struct FlatNetwork {
    pub base_latency_ms: f64,
    pub distance_factor_ms: f64,
    pub energy_per_byte_j: f64,
}

impl Default for FlatNetwork {
    fn default() -> Self {
        FlatNetwork {
            base_latency_ms: 10.0,
            distance_factor_ms: 0.1,
            energy_per_byte_j: 1e-6,
        }
    }
}

impl NetworkModel for FlatNetwork {
    fn simulate_transmission(&self, bytes: u64, distance: f64) -> Transmission {
        Transmission {
            success: true,
            latency_ms: self.base_latency_ms + self.distance_factor_ms * distance,
            energy_j: bytes as f64 * self.energy_per_byte_j,
            reason: "ok",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_network_latency() {
        let net = FlatNetwork::default();
        let tx = net.simulate_transmission(2048, 100.0);
        assert!(tx.success);
        assert_eq!(tx.latency_ms, 10.0 + 0.1 * 100.0);
        assert!(tx.energy_j > 0.0);
    }

    #[test]
    fn test_zero_distance_costs_base_latency() {
        let net = FlatNetwork::default();
        let tx = net.simulate_transmission(0, 0.0);
        assert_eq!(tx.latency_ms, 10.0);
        assert_eq!(tx.energy_j, 0.0);
    }
}
