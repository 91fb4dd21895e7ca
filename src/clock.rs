//! Monotonic time source for the polling loop.
//!
//! Everything in the door core is driven by explicit timestamps taken from a
//! [`Clock`]. The system clock is backed by `embassy-time`, which keeps the
//! core portable to a microcontroller time driver; [`ManualClock`] lets
//! simulations and tests step time deterministically.

use embassy_time::{Duration, Instant};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of monotonic time plus the one blocking wait the system allows.
pub trait Clock {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Block the calling context for `duration`.
    ///
    /// Used only for the relay pulse hold.
    fn block_for(&self, duration: Duration);
}

/// Wall-clock backed implementation using the embassy-time std driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn block_for(&self, duration: Duration) {
        embassy_time::block_for(duration);
    }
}

/// Manually stepped clock.
///
/// `block_for` advances the clock instead of waiting, so a relay pulse
/// consumes exactly its configured duration of simulated time.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_ms` milliseconds.
    pub fn new(start_ms: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_ms),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        self.millis.fetch_add(duration.as_millis(), Ordering::SeqCst);
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, instant: Instant) {
        self.millis.fetch_max(instant.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.millis.load(Ordering::SeqCst))
    }

    fn block_for(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn block_for(&self, duration: Duration) {
        (**self).block_for(duration)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn block_for(&self, duration: Duration) {
        (**self).block_for(duration)
    }
}
