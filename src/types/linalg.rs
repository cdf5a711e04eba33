//! Linear algebra types for the posture pipeline
//!
//! Vectors come straight from nalgebra. The quaternion is our own because the
//! filter and classifiers also use it as a packed 4-tuple of per-axis angles
//! (components 0..=2) and need clamped indexed access, which nalgebra's
//! unit-quaternion API does not model.

use nalgebra::Vector3;
use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

pub type Vec3 = Vector3<f32>;

/// Scalar part plus vector part.
///
/// Two conventions share this type:
/// - rotation quaternion: `w + xi + yj + zk`
/// - angle triple: components 0..=2 hold per-axis angles in degrees, component 3 is zero
///
/// Callers track which one is in play.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub v: Vec3,
}

impl Quaternion {
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, v: Vec3::new(x, y, z) }
    }

    pub fn zero() -> Self {
        Self { w: 0.0, v: Vec3::zeros() }
    }

    /// Packs a per-axis triple into components 0..=2.
    pub fn from_triple(t: Vec3) -> Self {
        Self::new(t.x, t.y, t.z, 0.0)
    }

    /// Unpacks components 0..=2.
    pub fn triple(&self) -> Vec3 {
        Vec3::new(self.w, self.v.x, self.v.y)
    }

    pub fn norm_squared(&self) -> f32 {
        self.w * self.w + self.v.norm_squared()
    }

    pub fn norm(&self) -> f32 {
        self.norm_squared().sqrt()
    }

    pub fn conjugate(&self) -> Self {
        Self { w: self.w, v: -self.v }
    }

    /// Multiplicative inverse. The zero quaternion maps to itself.
    pub fn reciprocal(&self) -> Self {
        let n2 = self.norm_squared();
        if n2 == 0.0 {
            return Self::zero();
        }
        self.conjugate() / n2
    }

    /// Unit-length copy. The zero quaternion maps to itself.
    pub fn normalize(&self) -> Self {
        *self / self.norm()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::zero()
    }
}

impl Index<usize> for Quaternion {
    type Output = f32;

    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.w,
            1 => &self.v.x,
            2 => &self.v.y,
            _ => &self.v.z,
        }
    }
}

impl IndexMut<usize> for Quaternion {
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        match i {
            0 => &mut self.w,
            1 => &mut self.v.x,
            2 => &mut self.v.y,
            _ => &mut self.v.z,
        }
    }
}

impl Add for Quaternion {
    type Output = Self;

    fn add(self, q: Self) -> Self {
        Self { w: self.w + q.w, v: self.v + q.v }
    }
}

impl Sub for Quaternion {
    type Output = Self;

    fn sub(self, q: Self) -> Self {
        Self { w: self.w - q.w, v: self.v - q.v }
    }
}

impl Neg for Quaternion {
    type Output = Self;

    fn neg(self) -> Self {
        Self { w: -self.w, v: -self.v }
    }
}

/// Hamilton product.
impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, q: Self) -> Self {
        Self {
            w: self.w * q.w - self.v.dot(&q.v),
            v: q.v * self.w + self.v * q.w + self.v.cross(&q.v),
        }
    }
}

impl Mul<f32> for Quaternion {
    type Output = Self;

    fn mul(self, c: f32) -> Self {
        Self { w: self.w * c, v: self.v * c }
    }
}

/// Division by zero yields the zero quaternion rather than infinities.
impl Div<f32> for Quaternion {
    type Output = Self;

    fn div(self, c: f32) -> Self {
        if c == 0.0 {
            return Self::zero();
        }
        Self { w: self.w / c, v: self.v / c }
    }
}

impl AddAssign for Quaternion {
    fn add_assign(&mut self, q: Self) {
        self.w += q.w;
        self.v += q.v;
    }
}

impl SubAssign for Quaternion {
    fn sub_assign(&mut self, q: Self) {
        self.w -= q.w;
        self.v -= q.v;
    }
}

impl MulAssign<f32> for Quaternion {
    fn mul_assign(&mut self, c: f32) {
        self.w *= c;
        self.v *= c;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_hamilton_basis() {
        let i = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        let j = Quaternion::new(0.0, 0.0, 1.0, 0.0);
        let k = Quaternion::new(0.0, 0.0, 0.0, 1.0);

        assert_eq!(i * j, k);
        assert_eq!(j * i, -k);
        assert_eq!(i * i, Quaternion::new(-1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_reciprocal_product_is_identity() {
        let q = Quaternion::new(1.0, 2.0, -3.0, 0.5);
        let p = q * q.reciprocal();

        assert_relative_eq!(p.w, 1.0, epsilon = 1e-6);
        assert_relative_eq!(p.v.norm(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_is_fixed_point() {
        let z = Quaternion::zero();
        assert_eq!(z.reciprocal(), z);
        assert_eq!(z.normalize(), z);
        assert_eq!(Quaternion::new(1.0, 1.0, 1.0, 1.0) / 0.0, z);
    }

    #[test]
    fn test_normalize() {
        let q = Quaternion::new(2.0, 0.0, 0.0, 0.0).normalize();
        assert_relative_eq!(q.norm(), 1.0);

        let q = Quaternion::new(1.0, -2.0, 3.0, 4.0).normalize();
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_index_clamps_high() {
        let mut q = Quaternion::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(q[0], 1.0);
        assert_eq!(q[3], 4.0);
        assert_eq!(q[9], 4.0);

        q[7] = -1.0;
        assert_eq!(q.v.z, -1.0);
    }

    #[test]
    fn test_triple_round_trip_leaves_last_component_zero() {
        let q = Quaternion::from_triple(Vec3::new(10.0, 20.0, 30.0));
        assert_eq!(q[3], 0.0);
        assert_eq!(q.triple(), Vec3::new(10.0, 20.0, 30.0));
    }
}
