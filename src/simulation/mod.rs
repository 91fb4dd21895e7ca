//! Simulated hardware for running the controller without a real door.
//!
//! The simulated sensor and relay share one [`SimulatedDoor`], so relay pulses
//! issued by the controller show up as motion in the distance readings.

pub mod door;
pub mod hardware;

pub use door::{Motion, SimulatedDoor};
pub use hardware::{SimulatedRangingSensor, SimulatedRelay};
