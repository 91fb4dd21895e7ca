//! Door state estimation, publish scheduling and relay control.
//!
//! - `position`: classifies a distance reading into a [`DoorPosition`]
//! - `scheduler`: picks the telemetry interval and tracks the settling window
//! - `relay`: pulses the opener contact
//! - `controller`: the polling loop tying these to the sensor, display and broker

pub mod controller;
pub mod position;
pub mod relay;
pub mod scheduler;

pub use controller::DoorController;
pub use position::{DoorPosition, classify};
pub use relay::{RelayActuator, RelayPin};
pub use scheduler::{PublishMode, PublishScheduler};
