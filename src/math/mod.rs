//! Scalar math helpers
//!
//! Pure functions shared by the guidance geometry: safe square root,
//! epsilon comparisons, horizontal norms and centi-degree conversions.

pub mod geo;

use libm::{atan2f, sqrtf};
use nalgebra::Vector3;

/// Gravitational acceleration in m/s/s
pub const GRAVITY_MSS: f32 = 9.80665;

/// Centi-degrees per radian
pub const DEGX100: f32 = 5729.57795;

/// Epsilon used for near-zero float comparisons
const FLOAT_EPSILON: f32 = 1.0e-6;

/// Square of a value
#[inline]
pub fn sq(v: f32) -> f32 {
    v * v
}

/// Square root that returns 0 for negative (or NaN) inputs
#[inline]
pub fn safe_sqrt(v: f32) -> f32 {
    let ret = sqrtf(v);
    if ret.is_nan() {
        return 0.0;
    }
    ret
}

/// Check if a float is within epsilon of zero
#[inline]
pub fn is_zero(v: f32) -> bool {
    v.abs() < FLOAT_EPSILON
}

/// Check if a float is greater than epsilon
#[inline]
pub fn is_positive(v: f32) -> bool {
    v >= FLOAT_EPSILON
}

/// Check if two floats are within epsilon of each other
#[inline]
pub fn is_equal(a: f32, b: f32) -> bool {
    (a - b).abs() < FLOAT_EPSILON
}

/// Length of a 2D vector given its components
#[inline]
pub fn norm_xy(x: f32, y: f32) -> f32 {
    sqrtf(x * x + y * y)
}

/// Horizontal length of a 3D vector
#[inline]
pub fn length_xy(v: &Vector3<f32>) -> f32 {
    norm_xy(v.x, v.y)
}

/// Wrap an angle in centi-degrees to [0, 36000)
pub fn wrap_360_cd(angle_cd: f32) -> f32 {
    let mut res = angle_cd % 36000.0;
    if res < 0.0 {
        res += 36000.0;
    }
    res
}

/// Convert an angle in radians to centi-degrees in [0, 36000)
#[inline]
pub fn radians_to_centidegrees(rad: f32) -> f32 {
    wrap_360_cd(rad * DEGX100)
}

/// Bearing from `origin` to `destination` in centi-degrees [0, 36000)
///
/// Measured clockwise from north (the x axis of the NEU frame).
pub fn bearing_cd(origin: &Vector3<f32>, destination: &Vector3<f32>) -> f32 {
    let bearing = atan2f(destination.y - origin.y, destination.x - origin.x) * DEGX100;
    wrap_360_cd(bearing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_sqrt_positive() {
        assert!((safe_sqrt(4.0) - 2.0).abs() < 0.0001);
    }

    #[test]
    fn test_safe_sqrt_negative_returns_zero() {
        assert!((safe_sqrt(-1.0) - 0.0).abs() < 0.0001);
    }

    #[test]
    fn test_is_zero() {
        assert!(is_zero(0.0));
        assert!(is_zero(1.0e-7));
        assert!(!is_zero(0.001));
        assert!(!is_zero(-0.001));
    }

    #[test]
    fn test_is_positive() {
        assert!(is_positive(0.001));
        assert!(!is_positive(0.0));
        assert!(!is_positive(-0.001));
    }

    #[test]
    fn test_norm_xy() {
        assert!((norm_xy(3.0, 4.0) - 5.0).abs() < 0.0001);
        assert!((norm_xy(0.0, 0.0) - 0.0).abs() < 0.0001);
    }

    #[test]
    fn test_wrap_360_cd() {
        assert!((wrap_360_cd(0.0) - 0.0).abs() < 0.001);
        assert!((wrap_360_cd(36000.0) - 0.0).abs() < 0.001);
        assert!((wrap_360_cd(-9000.0) - 27000.0).abs() < 0.001);
        assert!((wrap_360_cd(45000.0) - 9000.0).abs() < 0.001);
    }

    #[test]
    fn test_bearing_cd_cardinal_directions() {
        let origin = Vector3::new(0.0, 0.0, 0.0);

        // North
        let bearing = bearing_cd(&origin, &Vector3::new(100.0, 0.0, 0.0));
        assert!(bearing.abs() < 1.0, "north bearing should be ~0, got {}", bearing);

        // East
        let bearing = bearing_cd(&origin, &Vector3::new(0.0, 100.0, 0.0));
        assert!((bearing - 9000.0).abs() < 1.0, "east bearing should be ~9000, got {}", bearing);

        // South
        let bearing = bearing_cd(&origin, &Vector3::new(-100.0, 0.0, 0.0));
        assert!((bearing - 18000.0).abs() < 1.0, "south bearing should be ~18000, got {}", bearing);

        // West
        let bearing = bearing_cd(&origin, &Vector3::new(0.0, -100.0, 0.0));
        assert!((bearing - 27000.0).abs() < 1.0, "west bearing should be ~27000, got {}", bearing);
    }

    #[test]
    fn test_bearing_cd_altitude_ignored() {
        let origin = Vector3::new(0.0, 0.0, 500.0);
        let bearing = bearing_cd(&origin, &Vector3::new(100.0, 100.0, -200.0));
        assert!((bearing - 4500.0).abs() < 1.0, "bearing should be ~4500, got {}", bearing);
    }
}
