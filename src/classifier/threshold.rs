use log::debug;
use serde::{Deserialize, Serialize};

use super::{LinearModel, TickContext, Verdict};
use crate::error::MonitorResult;
use crate::types::ImuSample;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub model: LinearModel,
    pub period_ms: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            model: LinearModel::reference_threshold(),
            period_ms: 20,
        }
    }
}

/// Linear decision rule over every sensor's angles and gravity components.
///
/// Level-triggered: the verdict goes out as `1`/`0` on every tick.
pub struct ThresholdClassifier {
    model: LinearModel,
    last: Option<Verdict>,
}

impl ThresholdClassifier {
    pub fn new(config: &ThresholdConfig, sensor_count: usize) -> MonitorResult<Self> {
        config.model.validate(sensor_count)?;
        Ok(Self {
            model: config.model.clone(),
            last: None,
        })
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    pub fn last_verdict(&self) -> Option<Verdict> {
        self.last
    }

    /// Pure decision on already collected samples, in model term order.
    pub fn decide(&self, samples: &[ImuSample]) -> (f32, Verdict) {
        let c = self.model.combination(samples);
        (c, Verdict::from_good(c > self.model.bias))
    }

    pub(crate) fn evaluate(&mut self, ctx: &mut TickContext<'_>) -> MonitorResult<Verdict> {
        let samples = self.model.sample(ctx.sensors)?;
        let (c, verdict) = self.decide(&samples);
        debug!("threshold: combination {:.4} vs bias {:.4} -> {}", c, self.model.bias, verdict);

        ctx.link.write_int(verdict.is_good() as i64, Some(ctx.terminator));
        self.last = Some(verdict);
        Ok(verdict)
    }
}
