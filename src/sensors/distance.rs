//! Distance sampling over a continuous-ranging time-of-flight sensor.
//!
//! The sensor ranges on its own and buffers the latest result. Sampling never
//! waits for a fresh conversion: [`DistanceSampler::poll`] reads whatever is
//! buffered and stamps it with the clock.

use crate::clock::Clock;
use embassy_time::Instant;
use log::{debug, info};
use thiserror::Error;

/// Errors raised by a ranging sensor driver.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The sensor did not answer on the bus.
    #[error("sensor not detected")]
    NotDetected,

    /// The sensor answered but did not finish its boot sequence in time.
    #[error("sensor boot timed out")]
    Timeout,

    /// Bus-level failure reported by the driver.
    #[error("bus error: {0}")]
    Bus(String),
}

/// One distance reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceSample {
    pub distance_mm: u16,
    pub observed_at: Instant,
}

/// Driver interface for a continuous-ranging distance sensor.
pub trait RangingSensor {
    /// Bring the sensor up and start continuous ranging.
    fn start_continuous(&mut self) -> Result<(), SensorError>;

    /// Most recent buffered range in millimetres.
    fn latest_range_mm(&mut self) -> u16;
}

/// Timestamped, non-blocking view of a started ranging sensor.
pub struct DistanceSampler<S: RangingSensor, C: Clock> {
    sensor: S,
    clock: C,
}

impl<S: RangingSensor, C: Clock> DistanceSampler<S, C> {
    /// Start the sensor. A failure here is fatal for the caller: readings
    /// from a sensor that did not come up cannot be trusted.
    pub fn start(mut sensor: S, clock: C) -> Result<Self, SensorError> {
        sensor.start_continuous()?;
        info!("[Sensor] online, continuous ranging started");
        Ok(Self { sensor, clock })
    }

    /// Read the latest buffered range.
    pub fn poll(&mut self) -> DistanceSample {
        let sample = DistanceSample {
            distance_mm: self.sensor.latest_range_mm(),
            observed_at: self.clock.now(),
        };
        debug!("[Sensor] Distance: {} mm", sample.distance_mm);
        sample
    }

    /// An endless sequence of samples, one per `next()`.
    ///
    /// Each call starts a new sequence over the same sensor; the caller
    /// chooses the cadence.
    pub fn samples(&mut self) -> Samples<'_, S, C> {
        Samples { sampler: self }
    }
}

/// Iterator returned by [`DistanceSampler::samples`]. Never ends.
pub struct Samples<'a, S: RangingSensor, C: Clock> {
    sampler: &'a mut DistanceSampler<S, C>,
}

impl<S: RangingSensor, C: Clock> Iterator for Samples<'_, S, C> {
    type Item = DistanceSample;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.sampler.poll())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
