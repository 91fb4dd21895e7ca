//! Publish-rate scheduling for distance telemetry.
//!
//! The scheduler runs in one of two modes. [`PublishMode::Fast`] publishes at
//! the moving interval and is held for a settling window after the door is
//! seen in transit or the relay is pulsed. Outside that window a door at
//! rest drops to [`PublishMode::Slow`].
//!
//! The window absorbs two latencies: between a relay pulse and the door
//! visibly moving, and between the door stopping and its end position being
//! reported. A single noisy reading near a threshold only extends the window,
//! it never makes the interval flap.

use super::position::DoorPosition;
use crate::config::CalibrationConfig;
use embassy_time::{Duration, Instant};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum PublishMode {
    Fast,
    Slow,
}

#[derive(Debug, Clone)]
pub struct PublishScheduler {
    moving_interval: Duration,
    idle_interval: Duration,
    settle_duration: Duration,
    mode: PublishMode,
    settle_until: Instant,
}

impl PublishScheduler {
    /// Create a scheduler whose settling window starts at `now`, so the
    /// first readings after start-up go out at the fast cadence.
    pub fn new(config: &CalibrationConfig, now: Instant) -> Self {
        let settle_duration = config.settle_duration();
        Self {
            moving_interval: config.moving_interval(),
            idle_interval: config.idle_interval(),
            settle_duration,
            mode: PublishMode::Fast,
            settle_until: now + settle_duration,
        }
    }

    /// Apply one classification tick. Returns the resulting mode.
    pub fn on_classification(&mut self, now: Instant, position: DoorPosition) -> PublishMode {
        self.mode = if position == DoorPosition::InTransit {
            self.settle_until = now + self.settle_duration;
            PublishMode::Fast
        } else if now <= self.settle_until {
            PublishMode::Fast
        } else {
            PublishMode::Slow
        };
        self.mode
    }

    /// A relay pulse just happened: open a fresh settling window.
    pub fn on_actuation(&mut self, now: Instant) {
        self.settle_until = now + self.settle_duration;
        self.mode = PublishMode::Fast;
    }

    pub fn current_interval(&self) -> Duration {
        match self.mode {
            PublishMode::Fast => self.moving_interval,
            PublishMode::Slow => self.idle_interval,
        }
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    pub fn settle_until(&self) -> Instant {
        self.settle_until
    }

    pub fn is_settling(&self, now: Instant) -> bool {
        now <= self.settle_until
    }
}
