use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::controller::Controller;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SensorSummary {
    pub name: String,
    pub calibrated: bool,
    pub gyro_bias: [f32; 3],
    pub healthy: bool,
    pub total_failures: u64,
}

/// End-of-session snapshot written next to the logs.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionSummary {
    pub started_at: String,
    pub finished_at: String,
    pub uptime_seconds: f64,
    pub classifier: String,
    pub commands: u64,
    pub calibrations: u64,
    pub failed_calibrations: u64,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub good_verdicts: u64,
    pub bad_verdicts: u64,
    pub telemetry_lines: u64,
    pub dropped_requests: u64,
    pub unknown_bytes: u64,
    pub link_write_errors: u64,
    pub last_verdict: Option<String>,
    pub sensors: Vec<SensorSummary>,
}

impl SessionSummary {
    pub fn from_controller(controller: &Controller, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        let stats = controller.stats();
        let sensors = controller
            .sensors()
            .iter()
            .zip(controller.health().sensors())
            .map(|(imu, health)| {
                let b = imu.calibration().gyro_bias;
                SensorSummary {
                    name: imu.name().to_string(),
                    calibrated: imu.is_calibrated(),
                    gyro_bias: [b.x, b.y, b.z],
                    healthy: health.is_healthy(),
                    total_failures: health.total_failures,
                }
            })
            .collect();

        Self {
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            uptime_seconds: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            classifier: controller.classifier_kind().to_string(),
            commands: stats.commands,
            calibrations: stats.calibrations,
            failed_calibrations: stats.failed_calibrations,
            ticks: stats.ticks,
            skipped_ticks: stats.skipped_ticks,
            good_verdicts: stats.good_verdicts,
            bad_verdicts: stats.bad_verdicts,
            telemetry_lines: stats.telemetry_lines,
            dropped_requests: controller.queue().dropped(),
            unknown_bytes: controller.queue().unknown_bytes(),
            link_write_errors: controller.link().write_errors(),
            last_verdict: controller.last_verdict().map(|v| v.to_string()),
            sensors,
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::imu::Imu;
    use crate::indicator::LogIndicator;
    use crate::report::Reporter;
    use crate::sensors::{MotionProfile, SimulatedImu};

    #[test]
    fn test_summary_from_controller() {
        let mut config = MonitorConfig::default();
        config.calibration.startup_iterations = 10;
        config.sensors = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let sensors = config
            .sensors
            .iter()
            .map(|n| Imu::new(Box::new(SimulatedImu::new(n, MotionProfile::default()))))
            .collect();
        let mut c = Controller::new(config, sensors, Reporter::sink(), Box::new(LogIndicator::default())).unwrap();
        c.start().unwrap();

        let tx = c.sender();
        tx.notify(b'P');
        tx.notify(b'?');
        c.step();

        let s = SessionSummary::from_controller(&c, Utc::now());
        assert_eq!(s.classifier, "threshold");
        assert_eq!(s.commands, 1);
        assert_eq!(s.unknown_bytes, 1);
        assert_eq!(s.ticks, 1);
        assert_eq!(s.sensors.len(), 3);
        assert!(s.sensors.iter().all(|x| x.calibrated && x.healthy));
        assert!(s.last_verdict.is_some());

        let json = serde_json::to_string(&s).unwrap();
        let back: SessionSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ticks, 1);
    }
}
