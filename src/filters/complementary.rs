use serde::{Deserialize, Serialize};

use crate::types::{Quaternion, Vec3};

/// Integration step and accelerometer weight for one filter application.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSchedule {
    /// Seconds of gyro integration per step
    pub dt: f32,
    /// Weight of the accelerometer tilt, 0..=1
    pub blend: f32,
}

impl FilterSchedule {
    /// Seeds the state straight from the accelerometer.
    pub const INITIALIZE: Self = Self { dt: 0.0, blend: 1.0 };
    /// Used while building the calibration reference.
    pub const CALIBRATION: Self = Self { dt: 0.001, blend: 0.04 };
    /// Matches the main loop sampling interval.
    pub const TRACKING: Self = Self { dt: 0.04, blend: 0.2 };

    pub fn apply(&self, prev: Quaternion, gyro: Quaternion, accel: Quaternion) -> Quaternion {
        complementary(prev, gyro, accel, self.dt, self.blend)
    }
}

/// Blends gyro-integrated angles with accelerometer tilt.
///
/// All quaternions use the angle-triple convention; angles are degrees and
/// `gyro` is in deg/s.
pub fn complementary(
    prev: Quaternion,
    gyro: Quaternion,
    accel: Quaternion,
    dt: f32,
    blend: f32,
) -> Quaternion {
    let predicted = prev + gyro * dt;
    predicted * (1.0 - blend) + accel_tilt(accel.triple()) * blend
}

/// Per-axis tilt from the gravity direction, in degrees.
pub fn accel_tilt(a: Vec3) -> Quaternion {
    let (x2, y2, z2) = (a.x * a.x, a.y * a.y, a.z * a.z);
    Quaternion::from_triple(Vec3::new(
        a.x.atan2((y2 + z2).sqrt()).to_degrees(),
        a.y.atan2((x2 + z2).sqrt()).to_degrees(),
        (x2 + y2).sqrt().atan2(a.z).to_degrees(),
    ))
}
