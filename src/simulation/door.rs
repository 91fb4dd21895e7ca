//! Simulated garage door mechanics.
//!
//! Behaves like a single-button opener: a press on a stopped door starts it
//! moving opposite to its previous run, a press on a moving door stops it.
//! Travel is linear between the open and closed distances as seen from a
//! ceiling-mounted ranging sensor.

use crate::config::SimulationConfig;
use embassy_time::Instant;
use log::info;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Stopped,
    Opening,
    Closing,
}

#[derive(Debug)]
struct DoorModel {
    distance_mm: f32,
    motion: Motion,
    /// Direction of the most recent run, decides where the next press goes.
    last_run: Motion,
    updated_at: Instant,
}

/// Thread-safe door shared by the simulated sensor and relay.
#[derive(Debug)]
pub struct SimulatedDoor {
    open_mm: f32,
    closed_mm: f32,
    /// Travel speed in mm per millisecond.
    speed: f32,
    model: Mutex<DoorModel>,
}

impl SimulatedDoor {
    pub fn new(config: &SimulationConfig, now: Instant) -> Self {
        let open_mm = f32::from(config.open_distance_mm.min(config.closed_distance_mm));
        let closed_mm = f32::from(config.open_distance_mm.max(config.closed_distance_mm));
        let speed = (closed_mm - open_mm) / config.travel_time_ms.max(1) as f32;

        let (distance_mm, last_run) = if config.starts_closed {
            (closed_mm, Motion::Closing)
        } else {
            (open_mm, Motion::Opening)
        };

        Self {
            open_mm,
            closed_mm,
            speed,
            model: Mutex::new(DoorModel {
                distance_mm,
                motion: Motion::Stopped,
                last_run,
                updated_at: now,
            }),
        }
    }

    /// Press the opener button.
    pub fn press(&self, now: Instant) {
        let mut model = self.model.lock();
        self.advance(&mut model, now);

        model.motion = match model.motion {
            Motion::Stopped if model.last_run == Motion::Opening => Motion::Closing,
            Motion::Stopped => Motion::Opening,
            Motion::Opening | Motion::Closing => Motion::Stopped,
        };
        if model.motion != Motion::Stopped {
            model.last_run = model.motion;
        }

        info!(
            "[Sim] Opener pressed at {:.0} mm, door now {:?}",
            model.distance_mm, model.motion
        );
    }

    /// Distance from the sensor to the door at `now`.
    pub fn distance_mm(&self, now: Instant) -> u16 {
        let mut model = self.model.lock();
        self.advance(&mut model, now);
        model.distance_mm.round() as u16
    }

    pub fn motion(&self, now: Instant) -> Motion {
        let mut model = self.model.lock();
        self.advance(&mut model, now);
        model.motion
    }

    fn advance(&self, model: &mut DoorModel, now: Instant) {
        let elapsed_ms = now.as_millis().saturating_sub(model.updated_at.as_millis());
        if now > model.updated_at {
            model.updated_at = now;
        }

        let travel = self.speed * elapsed_ms as f32;
        match model.motion {
            Motion::Stopped => {}
            Motion::Opening => {
                model.distance_mm -= travel;
                if model.distance_mm <= self.open_mm {
                    model.distance_mm = self.open_mm;
                    model.motion = Motion::Stopped;
                }
            }
            Motion::Closing => {
                model.distance_mm += travel;
                if model.distance_mm >= self.closed_mm {
                    model.distance_mm = self.closed_mm;
                    model.motion = Motion::Stopped;
                }
            }
        }
    }
}
