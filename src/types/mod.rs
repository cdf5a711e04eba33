pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One accelerometer + gyroscope read from a single device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuFrame {
    /// Acceleration in g
    pub accel: [f32; 3],
    /// Angular rate in deg/s
    pub gyro: [f32; 3],
}

impl ImuFrame {
    pub fn new(accel: Vec3, gyro: Vec3) -> Self {
        Self {
            accel: [accel.x, accel.y, accel.z],
            gyro: [gyro.x, gyro.y, gyro.z],
        }
    }

    pub fn accel_vec(&self) -> Vec3 {
        Vec3::from(self.accel)
    }

    pub fn gyro_vec(&self) -> Vec3 {
        Vec3::from(self.gyro)
    }
}

/// Result of one tracking step on a calibrated sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImuSample {
    /// Filtered angle minus calibration reference (angle triple)
    pub deflection: Quaternion,
    /// Filtered angle (angle triple)
    pub absolute: Quaternion,
    /// Raw acceleration in g
    pub accel: Vec3,
}
