use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::DeviceError;
use crate::types::Vec3;

/// Register-level driver seam.
///
/// Implementations return scaled physical units: g for acceleration and
/// deg/s for angular rate. Every read is a bounded-time bus transaction.
pub trait ImuDevice: Send {
    fn name(&self) -> &str;

    fn read_accel(&mut self) -> Result<Vec3, DeviceError>;

    fn read_gyro_raw(&mut self) -> Result<Vec3, DeviceError>;
}

/// Motion of one simulated sensor: a slow sagittal sway around a resting tilt.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionProfile {
    /// Resting tilt about the sensor x axis, degrees
    pub base_tilt_deg: f32,
    /// Sway amplitude, degrees
    pub sway_deg: f32,
    pub sway_period_s: f32,
    /// Constant gyro offset, deg/s
    pub gyro_bias: [f32; 3],
    /// High-frequency accel jitter amplitude, g
    pub jitter_g: f32,
    /// Simulated seconds per accelerometer read
    pub sample_dt: f32,
    /// Inject a timeout on every n-th read (0 = never)
    pub fail_every: u64,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            base_tilt_deg: 0.0,
            sway_deg: 15.0,
            sway_period_s: 20.0,
            gyro_bias: [0.8, -0.5, 0.3],
            jitter_g: 0.01,
            sample_dt: 0.04,
            fail_every: 0,
        }
    }
}

/// Deterministic stand-in for a physical IMU, used when no hardware is attached.
pub struct SimulatedImu {
    name: String,
    profile: MotionProfile,
    t: f32,
    reads: u64,
}

impl SimulatedImu {
    pub fn new(name: &str, profile: MotionProfile) -> Self {
        Self {
            name: name.to_string(),
            profile,
            t: 0.0,
            reads: 0,
        }
    }

    fn tilt_deg(&self) -> f32 {
        let p = &self.profile;
        if p.sway_period_s <= 0.0 {
            return p.base_tilt_deg;
        }
        p.base_tilt_deg + p.sway_deg * (2.0 * PI * self.t / p.sway_period_s).sin()
    }

    fn tilt_rate_dps(&self) -> f32 {
        let p = &self.profile;
        if p.sway_period_s <= 0.0 {
            return 0.0;
        }
        let w = 2.0 * PI / p.sway_period_s;
        p.sway_deg * w * (w * self.t).cos()
    }

    fn check_fault(&mut self) -> Result<(), DeviceError> {
        self.reads += 1;
        let every = self.profile.fail_every;
        if every > 0 && self.reads % every == 0 {
            return Err(DeviceError::Timeout);
        }
        Ok(())
    }
}

impl ImuDevice for SimulatedImu {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_accel(&mut self) -> Result<Vec3, DeviceError> {
        self.check_fault()?;

        let tilt = self.tilt_deg().to_radians();
        let j = self.profile.jitter_g;
        let accel = Vec3::new(
            tilt.sin() + j * (37.0 * self.t).sin(),
            j * (29.0 * self.t).cos(),
            tilt.cos(),
        );
        self.t += self.profile.sample_dt;
        Ok(accel)
    }

    fn read_gyro_raw(&mut self) -> Result<Vec3, DeviceError> {
        self.check_fault()?;

        let b = self.profile.gyro_bias;
        Ok(Vec3::new(self.tilt_rate_dps() + b[0], b[1], b[2]))
    }
}
