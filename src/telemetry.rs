//! Diagnostic stream of per-sensor values, one line per tick.
//!
//! Each line holds, for every sensor in order, the three deflection angles
//! followed by the three acceleration components. The format is what the
//! offline coefficient fitting consumes.

use serde::{Deserialize, Serialize};

use crate::classifier::TickContext;
use crate::error::MonitorResult;
use crate::types::ImuSample;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub period_ms: u64,
    /// Fractional digits per value
    pub precision: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_ms: 100,
            precision: 4,
        }
    }
}

pub struct TelemetryStream {
    precision: usize,
    lines: u64,
}

impl TelemetryStream {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            precision: config.precision,
            lines: 0,
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Writes one line. Gated by the posture flag like the classifiers; a
    /// failed read writes nothing.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> MonitorResult<bool> {
        if !ctx.posture_enabled {
            return Ok(false);
        }
        let samples = ctx
            .sensors
            .iter_mut()
            .map(|imu| imu.sample())
            .collect::<MonitorResult<Vec<ImuSample>>>()?;

        let values: Vec<f32> = samples
            .iter()
            .flat_map(|s| {
                let a = s.deflection.triple();
                [a.x, a.y, a.z, s.accel.x, s.accel.y, s.accel.z]
            })
            .collect();

        let last = values.len().saturating_sub(1);
        for (i, v) in values.into_iter().enumerate() {
            let end = if i == last { ctx.terminator } else { " " };
            ctx.link.write_float(v, Some(end), self.precision);
        }
        self.lines += 1;
        Ok(true)
    }
}
