use log::debug;
use serde::{Deserialize, Serialize};

use super::{LinearModel, TickContext, TransitionReporter, Verdict};
use crate::error::MonitorResult;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeConfig {
    pub model: LinearModel,
    pub period_ms: u64,
}

impl Default for RidgeConfig {
    fn default() -> Self {
        Self {
            model: LinearModel::reference_ridge(),
            period_ms: 50,
        }
    }
}

/// Ridge-regression rule with edge-triggered `Good`/`Bad` reports.
pub struct RidgeClassifier {
    model: LinearModel,
    reporter: TransitionReporter,
}

impl RidgeClassifier {
    pub fn new(config: &RidgeConfig, sensor_count: usize) -> MonitorResult<Self> {
        config.model.validate(sensor_count)?;
        Ok(Self {
            model: config.model.clone(),
            reporter: TransitionReporter::default(),
        })
    }

    pub fn reporter(&self) -> &TransitionReporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut TransitionReporter {
        &mut self.reporter
    }

    pub(crate) fn evaluate(&mut self, ctx: &mut TickContext<'_>) -> MonitorResult<Verdict> {
        let samples = self.model.sample(ctx.sensors)?;
        let c = self.model.combination(&samples);
        let verdict = Verdict::from_good(c >= self.model.bias);
        debug!("ridge: combination {:.4} vs bias {:.4} -> {}", c, self.model.bias, verdict);

        self.reporter.report(verdict, ctx.link, ctx.terminator);
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::testing::{rig, total_reads};
    use crate::classifier::{PostureClassifier, SensorTerms};
    use crate::report::testing::SharedBuffer;
    use crate::report::Reporter;
    use crate::sensors::testing::ScriptHandle;
    use crate::types::Vec3;

    /// Good while sensor 0 leans no more than 10° forward.
    fn lean_model() -> RidgeConfig {
        RidgeConfig {
            model: LinearModel {
                terms: vec![SensorTerms {
                    sensor: 0,
                    angle: [-0.1, 0.0, 0.0],
                    accel: [0.0; 3],
                }],
                bias: -1.0,
            },
            period_ms: 0,
        }
    }

    fn lean(handle: &ScriptHandle, deg: f32) {
        let r = deg.to_radians();
        handle.set_accel(Vec3::new(r.sin(), 0.0, r.cos()));
    }

    struct Harness {
        sensors: Vec<crate::imu::Imu>,
        handles: Vec<ScriptHandle>,
        buf: SharedBuffer,
        link: Reporter,
        classifier: PostureClassifier,
    }

    impl Harness {
        fn new() -> Self {
            let (sensors, handles) = rig(1, Vec3::new(0.0, 0.0, 1.0));
            let buf = SharedBuffer::default();
            Self {
                sensors,
                handles,
                link: Reporter::new(Box::new(buf.clone())),
                buf,
                classifier: PostureClassifier::Ridge(RidgeClassifier::new(&lean_model(), 1).unwrap()),
            }
        }

        fn tick(&mut self, enabled: bool) -> Option<Verdict> {
            let mut ctx = TickContext {
                sensors: &mut self.sensors,
                link: &mut self.link,
                posture_enabled: enabled,
                terminator: "\n",
            };
            self.classifier.tick(&mut ctx).unwrap()
        }

        /// Ticks until the filter has settled on the scripted pose.
        fn settle(&mut self) {
            for _ in 0..100 {
                self.tick(true);
            }
        }
    }

    #[test]
    fn test_reports_first_tick_and_flips_only() {
        let mut h = Harness::new();

        for _ in 0..5 {
            assert_eq!(h.tick(true), Some(Verdict::Good));
        }
        assert_eq!(h.buf.contents(), "Good\n");

        lean(&h.handles[0], 30.0);
        h.settle();
        assert_eq!(h.buf.contents(), "Good\nBad\n");

        lean(&h.handles[0], 0.0);
        h.settle();
        assert_eq!(h.buf.contents(), "Good\nBad\nGood\n");
    }

    #[test]
    fn test_reset_rearms_first_report() {
        let mut h = Harness::new();
        h.tick(true);
        h.tick(true);
        h.classifier.reset_reporting();
        h.tick(true);
        assert_eq!(h.buf.contents(), "Good\nGood\n");
    }

    #[test]
    fn test_gating_preserves_state() {
        let mut h = Harness::new();
        h.tick(true);
        let reads = total_reads(&h.handles);

        lean(&h.handles[0], 30.0);
        for _ in 0..10 {
            assert_eq!(h.tick(false), None);
        }
        assert_eq!(total_reads(&h.handles), reads);
        assert_eq!(h.classifier.last_verdict(), Some(Verdict::Good));
        assert_eq!(h.buf.contents(), "Good\n");
    }

    #[test]
    fn test_inclusive_bias() {
        let config = RidgeConfig {
            model: LinearModel {
                terms: vec![SensorTerms {
                    sensor: 0,
                    angle: [0.0; 3],
                    accel: [0.0; 3],
                }],
                bias: 0.0,
            },
            period_ms: 0,
        };
        let (mut sensors, _) = rig(1, Vec3::new(0.0, 0.0, 1.0));
        let mut link = Reporter::sink();
        let mut c = RidgeClassifier::new(&config, 1).unwrap();
        let mut ctx = TickContext {
            sensors: &mut sensors,
            link: &mut link,
            posture_enabled: true,
            terminator: "\n",
        };
        assert_eq!(c.evaluate(&mut ctx).unwrap(), Verdict::Good);
    }
}
