use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        (other - self).length()
    }

    pub fn distance_squared(self, other: Vec3) -> f32 {
        (other - self).length_squared()
    }

    /// Unit vector in the same direction, or zero for a zero-length input.
    pub fn normalized(self) -> Vec3 {
        let len_sq = self.length_squared();
        if len_sq <= 0.0 || !len_sq.is_finite() {
            return Vec3::ZERO;
        }
        self * len_sq.sqrt().recip()
    }

    pub fn clamp_length(self, max_length: f32) -> Vec3 {
        let len_sq = self.length_squared();
        let max_length = max_length.max(0.0);
        if len_sq <= max_length * max_length {
            return self;
        }
        self.normalized() * max_length
    }

    pub fn clamp_components(self, min: f32, max: f32) -> Vec3 {
        Vec3 {
            x: self.x.clamp(min, max),
            y: self.y.clamp(min, max),
            z: self.z.clamp(min, max),
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Vec3) {
        *self = *self - rhs;
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;

    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_zero_vector_stays_zero() {
        assert_eq!(Vec3::ZERO.normalized(), Vec3::ZERO);
    }

    #[test]
    fn clamp_length_preserves_direction() {
        let clamped = Vec3::new(3.0, 0.0, 4.0).clamp_length(2.5);
        assert!((clamped.length() - 2.5).abs() < 1e-5);
        assert!((clamped.x / clamped.z - 0.75).abs() < 1e-5);
    }

    #[test]
    fn clamp_length_leaves_short_vectors_untouched() {
        let v = Vec3::new(0.5, 0.5, 0.0);
        assert_eq!(v.clamp_length(2.0), v);
    }

    #[test]
    fn clamp_components_is_per_axis() {
        let clamped = Vec3::new(5.0, -7.0, 0.25).clamp_components(-1.0, 1.0);
        assert_eq!(clamped, Vec3::new(1.0, -1.0, 0.25));
    }
}
