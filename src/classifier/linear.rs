use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};
use crate::imu::Imu;
use crate::types::ImuSample;

/// Weights applied to one sensor's deflection angles and raw acceleration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorTerms {
    pub sensor: usize,
    pub angle: [f32; 3],
    pub accel: [f32; 3],
}

/// `Σ angle·wₐ + accel·w_g` over a fixed, ordered set of sensors, compared
/// against `bias`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub terms: Vec<SensorTerms>,
    pub bias: f32,
}

impl LinearModel {
    /// Coefficients fitted offline for the three-sensor harness
    /// (neck, upper back, lower back).
    pub fn reference_threshold() -> Self {
        Self {
            terms: vec![
                SensorTerms {
                    sensor: 0,
                    angle: [0.014_977_39, -0.011_184_802, -0.032_147_824],
                    accel: [-2.167_588_3, 2.348_638_4, -2.030_030_4],
                },
                SensorTerms {
                    sensor: 1,
                    angle: [-0.030_590_16, 0.015_549_602, 0.012_609_562],
                    accel: [0.649_248_5, -1.847_956, 1.013_389_5],
                },
                SensorTerms {
                    sensor: 2,
                    angle: [0.003_762_414, -0.006_763_973, -0.014_074_311],
                    accel: [-0.094_575_15, 1.193_689_4, -0.662_241_3],
                },
            ],
            bias: 1.220_256_023_274_603_1,
        }
    }

    /// Angle-only subset of the reference table, biased so the calibration
    /// pose (zero deflection) classifies as good.
    pub fn reference_ridge() -> Self {
        let mut model = Self::reference_threshold();
        for t in &mut model.terms {
            t.accel = [0.0; 3];
        }
        model.bias = -0.5;
        model
    }

    pub fn validate(&self, sensor_count: usize) -> MonitorResult<()> {
        if self.terms.is_empty() {
            return Err(MonitorError::Config("linear model has no terms".to_string()));
        }
        for (i, t) in self.terms.iter().enumerate() {
            if t.sensor >= sensor_count {
                return Err(MonitorError::Config(format!(
                    "linear model term {} uses sensor {} but only {} are attached",
                    i, t.sensor, sensor_count
                )));
            }
            if self.terms[..i].iter().any(|o| o.sensor == t.sensor) {
                return Err(MonitorError::Config(format!(
                    "linear model lists sensor {} twice",
                    t.sensor
                )));
            }
        }
        Ok(())
    }

    /// Pulls one fresh sample per term, in term order.
    pub fn sample(&self, sensors: &mut [Imu]) -> MonitorResult<Vec<ImuSample>> {
        self.terms
            .iter()
            .map(|t| sensors[t.sensor].sample())
            .collect()
    }

    /// Weighted sum; `samples` must be in term order.
    pub fn combination(&self, samples: &[ImuSample]) -> f32 {
        self.terms
            .iter()
            .zip(samples)
            .map(|(t, s)| {
                let angles = s.deflection.triple();
                (0..3)
                    .map(|k| t.angle[k] * angles[k] + t.accel[k] * s.accel[k])
                    .sum::<f32>()
            })
            .sum()
    }
}
