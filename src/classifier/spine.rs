//! Geometric spine approximation.
//!
//! The back is modelled as a chain of rigid segments in the sagittal plane.
//! Each sensor sits on one point of the chain and supplies that point's
//! tangent direction; the curve is rebuilt by marching along the segments
//! from the origin, and posture is judged from the angles the curve subtends
//! at fixed arc-length anchors.

use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use super::{TickContext, TransitionReporter, Verdict};
use crate::error::{MonitorError, MonitorResult};
use crate::types::Quaternion;

pub type Point2 = Vector2<f64>;

/// Direction of the curve at a point, degrees from the x axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tangent {
    pub angle_deg: f64,
    cos: f64,
    sin: f64,
}

impl Tangent {
    pub fn from_degrees(angle_deg: f64) -> Self {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        Self { angle_deg, cos, sin }
    }

    pub fn direction(&self) -> Point2 {
        Point2::new(self.cos, self.sin)
    }
}

impl Default for Tangent {
    fn default() -> Self {
        Self::from_degrees(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpinePoint {
    pub distance_to_next: f64,
    pub left: Tangent,
    pub right: Tangent,
}

#[derive(Clone, Debug)]
pub struct SpineModel {
    points: Vec<SpinePoint>,
}

impl SpineModel {
    pub fn new(distances: &[f64]) -> MonitorResult<Self> {
        if distances.is_empty() {
            return Err(MonitorError::Config("spine model needs at least one point".to_string()));
        }
        if let Some(d) = distances.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(MonitorError::Config(format!(
                "spine segment length must be finite and non-negative, got {}",
                d
            )));
        }
        Ok(Self {
            points: distances
                .iter()
                .map(|&distance_to_next| SpinePoint {
                    distance_to_next,
                    left: Tangent::default(),
                    right: Tangent::default(),
                })
                .collect(),
        })
    }

    pub fn points(&self) -> &[SpinePoint] {
        &self.points
    }

    pub fn length(&self) -> f64 {
        self.points.iter().map(|p| p.distance_to_next).sum()
    }

    /// Sets both tangents of point `i`. Out-of-range indices are ignored.
    pub fn set_tangent(&mut self, i: usize, angle_deg: f64) {
        self.set_tangents(i, angle_deg, angle_deg);
    }

    pub fn set_tangents(&mut self, i: usize, left_deg: f64, right_deg: f64) {
        if let Some(p) = self.points.get_mut(i) {
            p.left = Tangent::from_degrees(left_deg);
            p.right = Tangent::from_degrees(right_deg);
        }
    }

    /// Curve position at arc length `s` (clamped to the curve).
    ///
    /// Inside a segment, the first half follows the right tangent of its
    /// start point and the second half the left tangent of its end point.
    /// The last point has no successor, so its whole segment follows its
    /// right tangent.
    pub fn point_at(&self, s: f64) -> Point2 {
        let mut pos = Point2::zeros();
        let mut remaining = s.clamp(0.0, self.length());

        for (i, p) in self.points.iter().enumerate() {
            if remaining <= 0.0 {
                break;
            }
            let take = remaining.min(p.distance_to_next);
            match self.points.get(i + 1) {
                Some(next) => {
                    let first = take.min(p.distance_to_next / 2.0);
                    pos += p.right.direction() * first;
                    pos += next.left.direction() * (take - first);
                }
                None => pos += p.right.direction() * take,
            }
            remaining -= take;
        }
        pos
    }

    /// Angle in degrees at the middle anchor of `[a, b, c]` (arc lengths),
    /// from the law of cosines. `None` when an anchor coincides with the
    /// vertex.
    pub fn angle_at(&self, anchors: [f64; 3]) -> Option<f64> {
        let [pa, pb, pc] = anchors.map(|s| self.point_at(s));
        let a = (pb - pa).norm();
        let c = (pb - pc).norm();
        let b = (pa - pc).norm();
        if a < 1e-9 || c < 1e-9 {
            return None;
        }
        let cos = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0);
        Some(cos.acos().to_degrees())
    }
}

/// How one sensor is mounted on the back: which filtered angle component
/// carries the sagittal tilt, its sign, and the offset that turns it into a
/// curve tangent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MountingTransform {
    pub axis: usize,
    pub sign: f32,
    pub offset_deg: f32,
}

impl MountingTransform {
    pub fn tangent_deg(&self, absolute: &Quaternion) -> f64 {
        (self.offset_deg + self.sign * absolute[self.axis]) as f64
    }
}

/// Acceptable angle range at one anchor triple.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AngleCheck {
    pub anchors: [f64; 3],
    pub min_deg: f64,
    pub max_deg: f64,
}

impl AngleCheck {
    pub fn accepts(&self, angle: Option<f64>) -> bool {
        angle.is_some_and(|a| a >= self.min_deg && a <= self.max_deg)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpineConfig {
    /// Segment length after each sensor, cm
    pub distances: Vec<f64>,
    /// Sensor feeding each spine point, in point order
    pub sensors: Vec<usize>,
    pub mountings: Vec<MountingTransform>,
    pub upper: AngleCheck,
    pub lower: AngleCheck,
    pub check_lower: bool,
    pub period_ms: u64,
}

impl Default for SpineConfig {
    fn default() -> Self {
        Self {
            distances: vec![12.0, 16.0, 14.0],
            sensors: vec![0, 1, 2],
            mountings: vec![
                MountingTransform { axis: 0, sign: 1.0, offset_deg: 90.0 },
                MountingTransform { axis: 0, sign: -1.0, offset_deg: 180.0 },
                MountingTransform { axis: 0, sign: 1.0, offset_deg: 90.0 },
            ],
            upper: AngleCheck {
                anchors: [0.0, 12.0, 28.0],
                min_deg: 139.0,
                max_deg: 152.0,
            },
            lower: AngleCheck {
                anchors: [12.0, 28.0, 42.0],
                min_deg: 137.0,
                max_deg: 153.0,
            },
            check_lower: false,
            period_ms: 100,
        }
    }
}

pub struct SpineClassifier {
    model: SpineModel,
    sensors: Vec<usize>,
    mountings: Vec<MountingTransform>,
    upper: AngleCheck,
    lower: Option<AngleCheck>,
    reporter: TransitionReporter,
}

impl SpineClassifier {
    pub fn new(config: &SpineConfig, sensor_count: usize) -> MonitorResult<Self> {
        let model = SpineModel::new(&config.distances)?;
        let n = config.distances.len();
        if config.sensors.len() != n || config.mountings.len() != n {
            return Err(MonitorError::Config(format!(
                "spine has {} points but {} sensors and {} mountings",
                n,
                config.sensors.len(),
                config.mountings.len()
            )));
        }
        if let Some(s) = config.sensors.iter().find(|s| **s >= sensor_count) {
            return Err(MonitorError::Config(format!(
                "spine uses sensor {} but only {} are attached",
                s, sensor_count
            )));
        }
        if let Some(m) = config.mountings.iter().find(|m| m.axis > 2) {
            return Err(MonitorError::Config(format!(
                "mounting axis {} is not an angle component",
                m.axis
            )));
        }

        Ok(Self {
            model,
            sensors: config.sensors.clone(),
            mountings: config.mountings.clone(),
            upper: config.upper,
            lower: config.check_lower.then_some(config.lower),
            reporter: TransitionReporter::default(),
        })
    }

    pub fn model(&self) -> &SpineModel {
        &self.model
    }

    pub fn reporter(&self) -> &TransitionReporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut TransitionReporter {
        &mut self.reporter
    }

    pub(crate) fn evaluate(&mut self, ctx: &mut TickContext<'_>) -> MonitorResult<Verdict> {
        // Read everything first so a failed read leaves the model untouched.
        let mut tangents = Vec::with_capacity(self.sensors.len());
        for (&id, mounting) in self.sensors.iter().zip(&self.mountings) {
            let sample = ctx.sensors[id].sample()?;
            tangents.push(mounting.tangent_deg(&sample.absolute));
        }
        for (i, t) in tangents.into_iter().enumerate() {
            self.model.set_tangent(i, t);
        }

        let upper = self.model.angle_at(self.upper.anchors);
        let mut good = self.upper.accepts(upper);
        if let Some(lower) = &self.lower {
            let angle = self.model.angle_at(lower.anchors);
            debug!("spine: lower angle {:?}", angle);
            good &= lower.accepts(angle);
        }
        let verdict = Verdict::from_good(good);
        debug!("spine: upper angle {:?} -> {}", upper, verdict);

        self.reporter.report(verdict, ctx.link, ctx.terminator);
        Ok(verdict)
    }
}
