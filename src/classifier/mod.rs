//! Posture classifiers.
//!
//! One strategy is active at a time. Each consumes fresh samples from a fixed
//! set of sensors and produces a good/bad verdict; how the verdict goes out on
//! the report link differs per strategy.

pub mod linear;
pub mod ridge;
pub mod spine;
pub mod threshold;

pub use linear::{LinearModel, SensorTerms};
pub use ridge::{RidgeClassifier, RidgeConfig};
pub use spine::{AngleCheck, MountingTransform, SpineClassifier, SpineConfig, SpineModel};
pub use threshold::{ThresholdClassifier, ThresholdConfig};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MonitorError, MonitorResult};
use crate::imu::Imu;
use crate::report::Reporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Good,
    Bad,
}

impl Verdict {
    pub fn from_good(good: bool) -> Self {
        if good {
            Verdict::Good
        } else {
            Verdict::Bad
        }
    }

    pub fn is_good(self) -> bool {
        self == Verdict::Good
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Good => "Good",
            Verdict::Bad => "Bad",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a classifier may touch during one tick.
pub struct TickContext<'a> {
    pub sensors: &'a mut [Imu],
    pub link: &'a mut Reporter,
    pub posture_enabled: bool,
    /// Appended after every report
    pub terminator: &'a str,
}

/// Edge-triggered report state: a verdict goes out on the first evaluation
/// after a reset and afterwards only when it differs from the previous one.
#[derive(Debug, Clone, Default)]
pub struct TransitionReporter {
    last: Option<Verdict>,
    reports: u64,
}

impl TransitionReporter {
    /// Records `verdict`; true when it must be reported.
    pub fn observe(&mut self, verdict: Verdict) -> bool {
        let changed = self.last != Some(verdict);
        self.last = Some(verdict);
        if changed {
            self.reports += 1;
        }
        changed
    }

    /// Re-arms the unconditional first report.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<Verdict> {
        self.last
    }

    pub fn reports(&self) -> u64 {
        self.reports
    }

    pub(crate) fn report(&mut self, verdict: Verdict, link: &mut Reporter, terminator: &str) {
        if self.observe(verdict) {
            link.write_word(verdict.label(), Some(terminator));
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    Threshold,
    Ridge,
    Spine,
}

impl FromStr for ClassifierKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threshold" => Ok(ClassifierKind::Threshold),
            "ridge" => Ok(ClassifierKind::Ridge),
            "spine" | "asf" => Ok(ClassifierKind::Spine),
            other => Err(MonitorError::Config(format!(
                "unknown classifier '{}' (expected threshold, ridge or spine)",
                other
            ))),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassifierKind::Threshold => "threshold",
            ClassifierKind::Ridge => "ridge",
            ClassifierKind::Spine => "spine",
        })
    }
}

pub enum PostureClassifier {
    Threshold(ThresholdClassifier),
    Ridge(RidgeClassifier),
    Spine(SpineClassifier),
}

impl PostureClassifier {
    pub fn kind(&self) -> ClassifierKind {
        match self {
            PostureClassifier::Threshold(_) => ClassifierKind::Threshold,
            PostureClassifier::Ridge(_) => ClassifierKind::Ridge,
            PostureClassifier::Spine(_) => ClassifierKind::Spine,
        }
    }

    /// One evaluation. With posture processing disabled this reads nothing,
    /// reports nothing and leaves all classifier state alone.
    pub fn tick(&mut self, ctx: &mut TickContext<'_>) -> MonitorResult<Option<Verdict>> {
        if !ctx.posture_enabled {
            return Ok(None);
        }
        let verdict = match self {
            PostureClassifier::Threshold(c) => c.evaluate(ctx)?,
            PostureClassifier::Ridge(c) => c.evaluate(ctx)?,
            PostureClassifier::Spine(c) => c.evaluate(ctx)?,
        };
        Ok(Some(verdict))
    }

    /// Called after recalibration so the next tick always reports.
    pub fn reset_reporting(&mut self) {
        match self {
            // reports every tick, nothing to re-arm
            PostureClassifier::Threshold(_) => {}
            PostureClassifier::Ridge(c) => c.reporter_mut().reset(),
            PostureClassifier::Spine(c) => c.reporter_mut().reset(),
        }
    }

    pub fn last_verdict(&self) -> Option<Verdict> {
        match self {
            PostureClassifier::Threshold(c) => c.last_verdict(),
            PostureClassifier::Ridge(c) => c.reporter().last(),
            PostureClassifier::Spine(c) => c.reporter().last(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::sensors::testing::{ScriptHandle, ScriptedImu};
    use crate::types::Vec3;

    /// `n` scripted sensors at rest, each calibrated against `accel`.
    pub fn rig(n: usize, accel: Vec3) -> (Vec<Imu>, Vec<ScriptHandle>) {
        (0..n)
            .map(|i| {
                let (dev, handle) = ScriptedImu::new(&format!("s{i}"), accel, Vec3::zeros());
                let mut imu = Imu::new(Box::new(dev));
                imu.calibrate(5).unwrap();
                (imu, handle)
            })
            .unzip()
    }

    pub fn total_reads(handles: &[ScriptHandle]) -> usize {
        handles.iter().map(|h| h.reads()).sum()
    }
}
