use thiserror::Error;

/// Transport-level failure reported by a device driver.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("bus timeout")]
    Timeout,

    #[error("device did not acknowledge")]
    Nack,

    #[error("device disconnected")]
    Disconnected,
}

/// Posture monitor error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("sensor {sensor}: {source}")]
    Device {
        sensor: String,
        #[source]
        source: DeviceError,
    },

    #[error("unknown command byte 0x{0:02x}")]
    UnknownCommandByte(u8),

    #[error("sensor {sensor}: calibration aborted after {completed}/{requested} samples: {source}")]
    CalibrationIncomplete {
        sensor: String,
        completed: u64,
        requested: u64,
        #[source]
        source: DeviceError,
    },

    #[error("sensor {sensor} unavailable after {attempts} attempts")]
    SensorUnavailable { sensor: String, attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MonitorError {
    /// Name of the sensor involved, if any.
    pub fn sensor(&self) -> Option<&str> {
        match self {
            MonitorError::Device { sensor, .. }
            | MonitorError::CalibrationIncomplete { sensor, .. }
            | MonitorError::SensorUnavailable { sensor, .. } => Some(sensor),
            MonitorError::UnknownCommandByte(_) | MonitorError::Config(_) => None,
        }
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
