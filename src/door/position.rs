//! Door position classification from a single distance reading.

use crate::config::CalibrationConfig;
use strum::{AsRefStr, Display};

/// Where the door is, as far as one reading can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DoorPosition {
    FullyOpen,
    FullyClosed,
    InTransit,
}

impl DoorPosition {
    /// True for either end position.
    pub fn is_at_rest(self) -> bool {
        !matches!(self, DoorPosition::InTransit)
    }
}

/// Classify a distance reading against the calibrated thresholds.
///
/// Both thresholds are exclusive: a reading exactly on either threshold is
/// [`DoorPosition::InTransit`].
pub fn classify(distance_mm: u16, config: &CalibrationConfig) -> DoorPosition {
    if distance_mm < config.open_threshold_mm {
        DoorPosition::FullyOpen
    } else if distance_mm > config.closed_threshold_mm {
        DoorPosition::FullyClosed
    } else {
        DoorPosition::InTransit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> CalibrationConfig {
        CalibrationConfig {
            open_threshold_mm: 240,
            closed_threshold_mm: 2540,
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn test_below_open_threshold_is_open() {
        let config = calibration();
        for distance in [0, 1, 100, 239] {
            assert_eq!(classify(distance, &config), DoorPosition::FullyOpen);
        }
    }

    #[test]
    fn test_above_closed_threshold_is_closed() {
        let config = calibration();
        for distance in [2541, 3000, u16::MAX] {
            assert_eq!(classify(distance, &config), DoorPosition::FullyClosed);
        }
    }

    #[test]
    fn test_between_thresholds_is_in_transit() {
        let config = calibration();
        for distance in [241, 1500, 2539] {
            assert_eq!(classify(distance, &config), DoorPosition::InTransit);
        }
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let config = calibration();
        assert_eq!(classify(240, &config), DoorPosition::InTransit);
        assert_eq!(classify(2540, &config), DoorPosition::InTransit);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let config = calibration();
        for distance in [0, 240, 1200, 2540, 2541] {
            assert_eq!(classify(distance, &config), classify(distance, &config));
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(DoorPosition::FullyOpen.to_string(), "FULLY_OPEN");
        assert_eq!(DoorPosition::FullyClosed.as_ref(), "FULLY_CLOSED");
        assert_eq!(DoorPosition::InTransit.to_string(), "IN_TRANSIT");
        assert!(DoorPosition::FullyClosed.is_at_rest());
        assert!(!DoorPosition::InTransit.is_at_rest());
    }
}
