use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::classifier::{ClassifierKind, RidgeConfig, SpineConfig, ThresholdConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::filters::FilterSchedule;
use crate::health_monitor::HealthConfig;
use crate::queue::OverflowPolicy;
use crate::sensors::MotionProfile;
use crate::telemetry::TelemetryConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Iterations for a 'C' request
    pub iterations: u32,
    /// Iterations for the power-up calibration
    pub startup_iterations: u32,
    pub schedule: FilterSchedule,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            startup_iterations: 3000,
            schedule: FilterSchedule::CALIBRATION,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// Motion of the simulated rig, one profile per sensor. Missing entries
/// fall back to `MotionProfile::default()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub profiles: Vec<MotionProfile>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let profile = |base_tilt_deg, sway_deg, sway_period_s| MotionProfile {
            base_tilt_deg,
            sway_deg,
            sway_period_s,
            ..MotionProfile::default()
        };
        Self {
            profiles: vec![
                profile(-50.0, 8.0, 20.0),
                profile(70.0, 5.0, 27.0),
                profile(20.0, 4.0, 33.0),
            ],
        }
    }
}

impl SimulationConfig {
    pub fn profile(&self, i: usize) -> MotionProfile {
        self.profiles.get(i).cloned().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sensor names, in harness order
    pub sensors: Vec<String>,
    pub calibration: CalibrationConfig,
    pub tracking: FilterSchedule,
    pub queue: QueueConfig,
    pub classifier: ClassifierKind,
    pub threshold: ThresholdConfig,
    pub ridge: RidgeConfig,
    pub spine: SpineConfig,
    pub telemetry: TelemetryConfig,
    pub health: HealthConfig,
    /// Posture processing state before the first 'P'/'D'
    pub posture_enabled: bool,
    /// Loop sleep when a step did no work
    pub idle_sleep_ms: u64,
    pub report_terminator: String,
    pub simulation: SimulationConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sensors: vec![
                "neck".to_string(),
                "upper_back".to_string(),
                "lower_back".to_string(),
            ],
            calibration: CalibrationConfig::default(),
            tracking: FilterSchedule::TRACKING,
            queue: QueueConfig::default(),
            classifier: ClassifierKind::default(),
            threshold: ThresholdConfig::default(),
            ridge: RidgeConfig::default(),
            spine: SpineConfig::default(),
            telemetry: TelemetryConfig::default(),
            health: HealthConfig::default(),
            posture_enabled: false,
            idle_sleep_ms: 1,
            report_terminator: "\n".to_string(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_json(text: &str) -> MonitorResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| MonitorError::Config(format!("parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> MonitorResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Checks that don't need the sensors. Classifier wiring is checked when
    /// the classifier is built.
    pub fn validate(&self) -> MonitorResult<()> {
        if self.sensors.is_empty() {
            return Err(MonitorError::Config("no sensors configured".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.sensors.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(MonitorError::Config(format!("duplicate sensor name '{}'", dup)));
        }
        if self.calibration.iterations == 0 || self.calibration.startup_iterations == 0 {
            return Err(MonitorError::Config(
                "calibration iterations must be positive".to_string(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(MonitorError::Config(
                "request queue capacity must be positive".to_string(),
            ));
        }
        if self.health.probe_attempts == 0 {
            return Err(MonitorError::Config("probe_attempts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn classifier_period_ms(&self) -> u64 {
        match self.classifier {
            ClassifierKind::Threshold => self.threshold.period_ms,
            ClassifierKind::Ridge => self.ridge.period_ms,
            ClassifierKind::Spine => self.spine.period_ms,
        }
    }
}
