use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::indicator::Indicator;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failed ticks before a sensor is declared faulty
    pub failure_threshold: u32,
    /// Probe attempts per sensor at startup
    pub probe_attempts: u32,
    pub probe_retry_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            probe_attempts: 3,
            probe_retry_ms: 10,
        }
    }
}

/// Tracks read failures for one sensor
#[derive(Clone, Debug, Serialize)]
pub struct SensorHealth {
    pub name: String,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub faulted: bool,
    pub last_error: Option<String>,
}

impl SensorHealth {
    pub fn new(name: &str) -> Self {
        SensorHealth {
            name: name.to_string(),
            consecutive_failures: 0,
            total_failures: 0,
            faulted: false,
            last_error: None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.faulted
    }

    /// Returns true if this clears an active fault.
    fn record_success(&mut self) -> bool {
        self.consecutive_failures = 0;
        std::mem::replace(&mut self.faulted, false)
    }

    /// Returns true if this failure crosses the threshold.
    fn record_failure(&mut self, err: &MonitorError, threshold: u32) -> bool {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_error = Some(err.to_string());
        if !self.faulted && self.consecutive_failures >= threshold {
            self.faulted = true;
            return true;
        }
        false
    }
}

/// Consecutive-failure tracking for the whole sensor set.
pub struct HealthMonitor {
    sensors: Vec<SensorHealth>,
    failure_threshold: u32,
}

impl HealthMonitor {
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>, failure_threshold: u32) -> Self {
        HealthMonitor {
            sensors: names.into_iter().map(SensorHealth::new).collect(),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn sensors(&self) -> &[SensorHealth] {
        &self.sensors
    }

    pub fn all_healthy(&self) -> bool {
        self.sensors.iter().all(|s| s.is_healthy())
    }

    /// `name` produced a full sample.
    pub fn record_success(&mut self, name: &str) {
        let Some(s) = self.sensors.iter_mut().find(|s| s.name == name) else {
            return;
        };
        if s.record_success() {
            info!("[{}] sensor recovered", s.name);
        }
    }

    /// Charges `err` to the sensor it names; errors without a sensor are
    /// ignored here.
    pub fn record_failure(&mut self, err: &MonitorError, indicator: &mut dyn Indicator) {
        let Some(name) = err.sensor() else {
            return;
        };
        let threshold = self.failure_threshold;
        let Some(s) = self.sensors.iter_mut().find(|s| s.name == name) else {
            warn!("failure reported for unknown sensor {}", name);
            return;
        };
        if s.record_failure(err, threshold) {
            error!(
                "[{}] unhealthy after {} consecutive failures: {}",
                s.name, s.consecutive_failures, err
            );
            indicator.signal_fault(&s.name);
        }
    }

    /// Format health status for logging
    pub fn format_status(&self) -> String {
        self.sensors
            .iter()
            .map(|s| {
                if s.is_healthy() {
                    format!("{}: ✓", s.name)
                } else {
                    format!("{}: ⚠ ({} failures)", s.name, s.consecutive_failures)
                }
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
