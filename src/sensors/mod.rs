//! Distance sensing for door position.
//!
//! This module provides the sensor driver interface and the sampler that turns
//! the sensor's buffered range into timestamped readings for the door core.

pub mod distance;

pub use distance::{DistanceSample, DistanceSampler, RangingSensor, SensorError};
