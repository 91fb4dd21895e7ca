//! Smart garage door controller library.
//!
//! Turns distance readings from a ceiling-mounted ranging sensor into a door
//! position, reports it to an MQTT broker at an adaptive rate, and pulses the
//! opener relay on command.

pub mod clock;
pub mod config;
pub mod display;
pub mod door;
pub mod error;
pub mod instance_lock;
pub mod sensors;
pub mod simulation;
pub mod transport;
