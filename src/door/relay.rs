//! Relay output driving the opener's push-button contact.
//!
//! A trigger is a single momentary pulse: drive the contact closed, hold it
//! for the configured duration, release it. The hold is a deliberate blocking
//! wait on the polling loop. Release is tied to a guard so the contact opens
//! again even if the wait unwinds.

use crate::clock::Clock;
use crate::config::RelayPolarity;
use embassy_time::Duration;
use log::info;

/// A single digital output pin.
pub trait RelayPin {
    /// Drive the pin high (`true`) or low (`false`).
    fn set_level(&mut self, high: bool);
}

impl<P: RelayPin + ?Sized> RelayPin for &mut P {
    fn set_level(&mut self, high: bool) {
        (**self).set_level(high)
    }
}

/// Relay actuator with a fixed output polarity.
pub struct RelayActuator<P: RelayPin> {
    pin: P,
    polarity: RelayPolarity,
    pulses: u32,
}

impl<P: RelayPin> RelayActuator<P> {
    /// Take ownership of the pin and drive it to the inactive level.
    pub fn new(mut pin: P, polarity: RelayPolarity) -> Self {
        pin.set_level(polarity.level(false));
        Self {
            pin,
            polarity,
            pulses: 0,
        }
    }

    /// Pulse the relay for `duration`, blocking the caller for that long.
    pub fn trigger<C: Clock>(&mut self, clock: &C, duration: Duration) {
        info!("[Relay] ON");
        {
            let _engaged = Engaged::new(&mut self.pin, self.polarity);
            clock.block_for(duration);
        }
        info!("[Relay] OFF");
        self.pulses = self.pulses.wrapping_add(1);
    }

    /// Number of completed pulses since start-up.
    pub fn pulse_count(&self) -> u32 {
        self.pulses
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

/// Holds the relay active for its lifetime.
struct Engaged<'a, P: RelayPin> {
    pin: &'a mut P,
    polarity: RelayPolarity,
}

impl<'a, P: RelayPin> Engaged<'a, P> {
    fn new(pin: &'a mut P, polarity: RelayPolarity) -> Self {
        pin.set_level(polarity.level(true));
        Self { pin, polarity }
    }
}

impl<P: RelayPin> Drop for Engaged<'_, P> {
    fn drop(&mut self) {
        self.pin.set_level(self.polarity.level(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;

    /// Pin that records every level change with the time it happened.
    struct TracePin {
        clock: Arc<ManualClock>,
        trace: Vec<(u64, bool)>,
    }

    impl RelayPin for TracePin {
        fn set_level(&mut self, high: bool) {
            self.trace.push((self.clock.now().as_millis(), high));
        }
    }

    /// Clock whose blocking wait panics, standing in for an interrupted hold.
    struct PanickingClock;

    impl Clock for PanickingClock {
        fn now(&self) -> embassy_time::Instant {
            embassy_time::Instant::from_millis(0)
        }

        fn block_for(&self, _duration: Duration) {
            panic!("hold interrupted");
        }
    }

    #[test]
    fn test_construction_drives_inactive_level() {
        let clock = Arc::new(ManualClock::new(0));
        let pin = TracePin {
            clock: clock.clone(),
            trace: Vec::new(),
        };
        let relay = RelayActuator::new(pin, RelayPolarity::ActiveLow);
        assert_eq!(relay.pin.trace, vec![(0, true)]);
        assert_eq!(relay.pulse_count(), 0);
    }

    #[test]
    fn test_active_low_pulse_holds_for_duration() {
        let clock = Arc::new(ManualClock::new(1_000));
        let pin = TracePin {
            clock: clock.clone(),
            trace: Vec::new(),
        };
        let mut relay = RelayActuator::new(pin, RelayPolarity::ActiveLow);

        relay.trigger(&clock, Duration::from_millis(300));

        assert_eq!(
            relay.pin.trace,
            vec![(1_000, true), (1_000, false), (1_300, true)]
        );
        assert_eq!(relay.pulse_count(), 1);
        assert_eq!(clock.now().as_millis(), 1_300);
    }

    #[test]
    fn test_active_high_pulse_levels() {
        let clock = Arc::new(ManualClock::new(0));
        let pin = TracePin {
            clock: clock.clone(),
            trace: Vec::new(),
        };
        let mut relay = RelayActuator::new(pin, RelayPolarity::ActiveHigh);

        relay.trigger(&clock, Duration::from_millis(250));
        relay.trigger(&clock, Duration::from_millis(250));

        assert_eq!(
            relay.pin.trace,
            vec![(0, false), (0, true), (250, false), (250, true), (500, false)]
        );
        assert_eq!(relay.pulse_count(), 2);
    }

    #[test]
    fn test_relay_released_when_hold_unwinds() {
        let clock = Arc::new(ManualClock::new(0));
        let mut pin = TracePin {
            clock,
            trace: Vec::new(),
        };

        {
            let mut relay = RelayActuator::new(&mut pin, RelayPolarity::ActiveLow);
            let result = catch_unwind(AssertUnwindSafe(|| {
                relay.trigger(&PanickingClock, Duration::from_millis(300));
            }));
            assert!(result.is_err());
        }

        let levels: Vec<bool> = pin.trace.iter().map(|(_, high)| *high).collect();
        assert_eq!(levels, vec![true, false, true]);
    }
}
