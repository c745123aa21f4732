//! Vector helpers over the `[f32; 3]` positions stored in tile data

use glam::Vec3;

/// Squared distance below which two points are considered equal
const EQUAL_THRESHOLD_SQR: f32 = (1.0 / 16384.0) * (1.0 / 16384.0);

/// Squares a value
#[inline]
pub fn sqr(a: f32) -> f32 {
    a * a
}

/// Returns the distance between two points
#[inline]
pub fn vdist(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    Vec3::from_array(*a).distance(Vec3::from_array(*b))
}

/// Returns the squared distance between two points
#[inline]
pub fn vdist_sqr(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    Vec3::from_array(*a).distance_squared(Vec3::from_array(*b))
}

/// Linearly interpolates between two points
#[inline]
pub fn vlerp(a: &[f32; 3], b: &[f32; 3], t: f32) -> [f32; 3] {
    Vec3::from_array(*a).lerp(Vec3::from_array(*b), t).to_array()
}

/// Returns `a + dir * s`
#[inline]
pub fn vmad(a: &[f32; 3], dir: &[f32; 3], s: f32) -> [f32; 3] {
    (Vec3::from_array(*a) + Vec3::from_array(*dir) * s).to_array()
}

/// Returns `b - a`
#[inline]
pub fn vsub(b: &[f32; 3], a: &[f32; 3]) -> [f32; 3] {
    (Vec3::from_array(*b) - Vec3::from_array(*a)).to_array()
}

/// Normalizes a vector, leaving zero vectors untouched
#[inline]
pub fn vnormalize(v: &[f32; 3]) -> [f32; 3] {
    Vec3::from_array(*v).normalize_or_zero().to_array()
}

/// Checks whether two points are within a tiny epsilon of each other
#[inline]
pub fn vequal(a: &[f32; 3], b: &[f32; 3]) -> bool {
    vdist_sqr(a, b) < EQUAL_THRESHOLD_SQR
}

/// Checks that all components are finite
#[inline]
pub fn visfinite(v: &[f32; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// Rounds up to the next power of two
#[inline]
pub fn next_pow2(v: u32) -> u32 {
    v.max(1).next_power_of_two()
}

/// Integer log2, `ilog2(0) == 0`
#[inline]
pub fn ilog2(v: u32) -> u32 {
    v.checked_ilog2().unwrap_or(0)
}

/// Align value to 4-byte boundary
#[inline]
pub fn align4(value: usize) -> usize {
    (value + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow2_helpers() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(5), 8);
        assert_eq!(next_pow2(64), 64);
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(1024), 10);
        assert_eq!(ilog2(1023), 9);
    }

    #[test]
    fn test_align4() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(54), 56);
        assert_eq!(align4(100), 100);
    }

    #[test]
    fn test_vector_ops() {
        let a = [0.0, 0.0, 0.0];
        let b = [3.0, 0.0, 4.0];
        assert_eq!(vdist(&a, &b), 5.0);
        assert_eq!(vdist_sqr(&a, &b), 25.0);
        assert_eq!(vlerp(&a, &b, 0.5), [1.5, 0.0, 2.0]);
        assert!(vequal(&b, &[3.0, 0.0, 4.0]));
        assert!(!visfinite(&[f32::NAN, 0.0, 0.0]));
    }
}
