//! Per-device energy accounting
//!
//! Tracks joules drawn in each power state. Battery constraints are
//! optional and disabled by default; when enabled, `consume` reports
//! depletion instead of going negative.

use serde::{Deserialize, Serialize};

/// Power state a device draws energy in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Idle,
    Processing,
    Transmit,
    Receive,
}

#[derive(Debug, Clone)]
struct Battery {
    capacity_j: f64,
    remaining_j: f64,
}

/// Energy meter with per-state draw rates
#[derive(Debug, Clone)]
pub struct EnergyMeter {
    idle_w: f64,
    processing_w: f64,
    transmit_w: f64,
    receive_w: f64,
    battery: Option<Battery>,

    total_j: f64,
    idle_j: f64,
    processing_j: f64,
    transmit_j: f64,
    receive_j: f64,
}

impl Default for EnergyMeter {
    fn default() -> Self {
        EnergyMeter {
            idle_w: 1.0,
            processing_w: 5.0,
            transmit_w: 2.0,
            receive_w: 1.5,
            battery: None,
            total_j: 0.0,
            idle_j: 0.0,
            processing_j: 0.0,
            transmit_j: 0.0,
            receive_j: 0.0,
        }
    }
}

impl EnergyMeter {
    /// Meter backed by a finite battery
    pub fn with_battery(capacity_j: f64) -> Self {
        EnergyMeter {
            battery: Some(Battery {
                capacity_j,
                remaining_j: capacity_j,
            }),
            ..Default::default()
        }
    }

    /// Draw energy for `seconds` in the given state.
    ///
    /// Returns false when a battery is present and depleted; the draw is
    /// still recorded so totals stay comparable across devices.
    pub fn consume(&mut self, state: PowerState, seconds: f64) -> bool {
        let watts = match state {
            PowerState::Idle => self.idle_w,
            PowerState::Processing => self.processing_w,
            PowerState::Transmit => self.transmit_w,
            PowerState::Receive => self.receive_w,
        };
        self.charge(state, watts * seconds)
    }

    /// Record a direct draw in joules (used for transmission energy
    /// reported by the network adapter)
    pub fn charge(&mut self, state: PowerState, joules: f64) -> bool {
        match state {
            PowerState::Idle => self.idle_j += joules,
            PowerState::Processing => self.processing_j += joules,
            PowerState::Transmit => self.transmit_j += joules,
            PowerState::Receive => self.receive_j += joules,
        }
        self.total_j += joules;

        match &mut self.battery {
            Some(b) => {
                if b.remaining_j < joules {
                    b.remaining_j = 0.0;
                    false
                } else {
                    b.remaining_j -= joules;
                    true
                }
            }
            None => true,
        }
    }

    pub fn total_j(&self) -> f64 {
        self.total_j
    }

    pub fn by_state(&self, state: PowerState) -> f64 {
        match state {
            PowerState::Idle => self.idle_j,
            PowerState::Processing => self.processing_j,
            PowerState::Transmit => self.transmit_j,
            PowerState::Receive => self.receive_j,
        }
    }

    /// Remaining battery charge as a percentage; 100 when unconstrained
    pub fn battery_percentage(&self) -> f64 {
        match &self.battery {
            Some(b) if b.capacity_j > 0.0 => b.remaining_j / b.capacity_j * 100.0,
            _ => 100.0,
        }
    }

    pub fn reset(&mut self) {
        let battery = self.battery.as_ref().map(|b| b.capacity_j);
        *self = EnergyMeter {
            battery: battery.map(|capacity_j| Battery {
                capacity_j,
                remaining_j: capacity_j,
            }),
            idle_w: self.idle_w,
            processing_w: self.processing_w,
            transmit_w: self.transmit_w,
            receive_w: self.receive_w,
            ..Default::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconstrained_meter_accumulates() {
        let mut meter = EnergyMeter::default();
        assert!(meter.consume(PowerState::Processing, 2.0));
        assert!(meter.consume(PowerState::Idle, 1.0));
        assert_eq!(meter.by_state(PowerState::Processing), 10.0);
        assert_eq!(meter.by_state(PowerState::Idle), 1.0);
        assert_eq!(meter.total_j(), 11.0);
        assert_eq!(meter.battery_percentage(), 100.0);
    }

    #[test]
    fn test_battery_depletion() {
        let mut meter = EnergyMeter::with_battery(8.0);
        assert!(meter.consume(PowerState::Processing, 1.0)); // 5 J
        assert!(!meter.consume(PowerState::Processing, 1.0)); // needs 5, has 3
        assert_eq!(meter.battery_percentage(), 0.0);
    }

    #[test]
    fn test_reset_restores_battery() {
        let mut meter = EnergyMeter::with_battery(10.0);
        meter.consume(PowerState::Transmit, 2.0);
        meter.reset();
        assert_eq!(meter.total_j(), 0.0);
        assert_eq!(meter.battery_percentage(), 100.0);
    }
}
