use crate::instance_lock::InstanceLockError;
use crate::sensors::SensorError;
use crate::transport::TransportError;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum GarageError {
    #[error("Invalid calibration: open threshold {open_mm} mm must be below closed threshold {closed_mm} mm")]
    InvalidThresholds { open_mm: u16, closed_mm: u16 },

    #[error("Invalid calibration: {0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidConfigValue { key: String, value: String },

    #[error("Distance sensor failed to initialize: {0}")]
    SensorInitFailed(#[from] SensorError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    InstanceLock(#[from] InstanceLockError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GarageError>;
