//! Sensor and relay backends wired to a [`SimulatedDoor`].

use super::door::SimulatedDoor;
use crate::clock::Clock;
use crate::config::{RelayPolarity, SimulationConfig};
use crate::door::relay::RelayPin;
use crate::sensors::{RangingSensor, SensorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Ranging sensor looking down at the simulated door, with uniform noise.
pub struct SimulatedRangingSensor<C: Clock> {
    door: Arc<SimulatedDoor>,
    clock: C,
    noise_mm: u16,
    present: bool,
    rng: StdRng,
}

impl<C: Clock> SimulatedRangingSensor<C> {
    pub fn new(door: Arc<SimulatedDoor>, clock: C, config: &SimulationConfig) -> Self {
        Self {
            door,
            clock,
            noise_mm: config.noise_mm,
            present: config.sensor_present,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed noise seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl<C: Clock> RangingSensor for SimulatedRangingSensor<C> {
    fn start_continuous(&mut self) -> Result<(), SensorError> {
        if self.present {
            Ok(())
        } else {
            Err(SensorError::NotDetected)
        }
    }

    fn latest_range_mm(&mut self) -> u16 {
        let exact = i32::from(self.door.distance_mm(self.clock.now()));
        let noise = i32::from(self.noise_mm);
        let offset = if noise > 0 {
            self.rng.gen_range(-noise..=noise)
        } else {
            0
        };
        (exact + offset).clamp(0, i32::from(u16::MAX)) as u16
    }
}

/// Relay contact wired across the simulated opener's push button.
pub struct SimulatedRelay<C: Clock> {
    door: Arc<SimulatedDoor>,
    clock: C,
    polarity: RelayPolarity,
    engaged: bool,
}

impl<C: Clock> SimulatedRelay<C> {
    pub fn new(door: Arc<SimulatedDoor>, clock: C, polarity: RelayPolarity) -> Self {
        Self {
            door,
            clock,
            polarity,
            engaged: false,
        }
    }
}

impl<C: Clock> RelayPin for SimulatedRelay<C> {
    fn set_level(&mut self, high: bool) {
        let engaged = high == self.polarity.level(true);
        // The opener reacts to the contact closing, not to how long it is held
        if engaged && !self.engaged {
            self.door.press(self.clock.now());
        }
        self.engaged = engaged;
    }
}
