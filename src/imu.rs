//! Calibrated sensor wrapper.
//!
//! An [`Imu`] owns one device plus everything derived from it: the gyro bias,
//! the calibration reference angle and the live complementary-filter state.
//! Nothing outside this module mutates those.

use log::{debug, info};

use crate::error::{DeviceError, MonitorError, MonitorResult};
use crate::filters::FilterSchedule;
use crate::sensors::ImuDevice;
use crate::types::{ImuSample, Quaternion, Vec3};

/// Gyro bias and reference angle produced by one full calibration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationRecord {
    pub gyro_bias: Vec3,
    pub reference: Quaternion,
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self {
            gyro_bias: Vec3::zeros(),
            reference: Quaternion::zero(),
        }
    }
}

pub struct Imu {
    device: Box<dyn ImuDevice>,
    calibration: CalibrationRecord,
    calibrated: bool,
    angles: Quaternion,
    calibration_schedule: FilterSchedule,
    tracking: FilterSchedule,
    samples: u64,
}

impl Imu {
    pub fn new(device: Box<dyn ImuDevice>) -> Self {
        Self::with_schedules(device, FilterSchedule::CALIBRATION, FilterSchedule::TRACKING)
    }

    pub fn with_schedules(
        device: Box<dyn ImuDevice>,
        calibration_schedule: FilterSchedule,
        tracking: FilterSchedule,
    ) -> Self {
        Self {
            device,
            calibration: CalibrationRecord::default(),
            calibrated: false,
            angles: Quaternion::zero(),
            calibration_schedule,
            tracking,
            samples: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Completed tracking samples since construction.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    fn device_error(&self, source: DeviceError) -> MonitorError {
        MonitorError::Device {
            sensor: self.name().to_string(),
            source,
        }
    }

    pub fn read_accel(&mut self) -> MonitorResult<Vec3> {
        self.device.read_accel().map_err(|e| self.device_error(e))
    }

    /// Angular rate with the calibrated bias removed.
    pub fn read_gyro(&mut self) -> MonitorResult<Vec3> {
        let raw = self.device.read_gyro_raw().map_err(|e| self.device_error(e))?;
        Ok(raw - self.calibration.gyro_bias)
    }

    /// Measures gyro bias and the resting reference angle.
    ///
    /// Runs to completion or not at all: on any device error the previous
    /// calibration record and filter state are kept.
    pub fn calibrate(&mut self, iterations: u32) -> MonitorResult<()> {
        if iterations == 0 {
            return Err(MonitorError::Config(
                "calibration needs at least one iteration".to_string(),
            ));
        }
        let requested = u64::from(iterations) * 2;
        let abort = |imu: &Self, completed: u64, source: DeviceError| {
            MonitorError::CalibrationIncomplete {
                sensor: imu.name().to_string(),
                completed,
                requested,
                source,
            }
        };

        info!("[{}] calibrating ({} iterations)", self.name(), iterations);

        let mut sum = Vec3::zeros();
        for i in 0..iterations {
            sum += self.device.read_gyro_raw().map_err(|e| abort(self, u64::from(i), e))?;
        }
        let gyro_bias = sum / iterations as f32;

        let accel = self.device.read_accel().map_err(|e| abort(self, u64::from(iterations), e))?;
        let mut reference = FilterSchedule::INITIALIZE.apply(
            Quaternion::zero(),
            Quaternion::zero(),
            Quaternion::from_triple(accel),
        );

        for i in 0..iterations {
            let gyro = self
                .device
                .read_gyro_raw()
                .map_err(|e| abort(self, u64::from(iterations) + u64::from(i), e))?
                - gyro_bias;
            let accel = self
                .device
                .read_accel()
                .map_err(|e| abort(self, u64::from(iterations) + u64::from(i), e))?;
            reference = self.calibration_schedule.apply(
                reference,
                Quaternion::from_triple(gyro),
                Quaternion::from_triple(accel),
            );
        }

        self.calibration = CalibrationRecord {
            gyro_bias,
            reference,
        };
        self.angles = reference;
        self.calibrated = true;

        debug!(
            "[{}] gyro bias {:?}, reference {:?}",
            self.name(),
            gyro_bias,
            reference.triple()
        );
        Ok(())
    }

    /// One tracking step. The filter only advances when both reads succeed.
    pub fn sample(&mut self) -> MonitorResult<ImuSample> {
        let gyro = self.read_gyro()?;
        let accel = self.read_accel()?;

        self.angles = self.tracking.apply(
            self.angles,
            Quaternion::from_triple(gyro),
            Quaternion::from_triple(accel),
        );
        self.samples += 1;

        Ok(ImuSample {
            deflection: self.angles - self.calibration.reference,
            absolute: self.angles,
            accel,
        })
    }

    /// Bias-corrected deflection from the calibration pose.
    pub fn orientation(&mut self) -> MonitorResult<Quaternion> {
        Ok(self.sample()?.deflection)
    }

    /// Filtered angle without the calibration reference removed.
    pub fn absolute_orientation(&mut self) -> MonitorResult<Quaternion> {
        Ok(self.sample()?.absolute)
    }
}
