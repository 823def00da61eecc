//! SO(3) helpers used when reporting rotation drift.

use nalgebra::{Matrix3, Vector3};

/// Below this value of `sqrt(R00² + R10²)` the decomposition is treated as
/// gimbal-locked.
const SINGULAR_THRESHOLD: f64 = 1e-6;

/// Decomposes a rotation matrix into Euler angles (radians).
///
/// Returns `(x, y, z)` such that `R = Rz(z) * Ry(y) * Rx(x)`. In the
/// singular configuration (|y| = 90°) the z angle is fixed to zero and the
/// remaining rotation is folded into x.
pub fn rotation_to_euler(r: &Matrix3<f64>) -> Vector3<f64> {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    if sy >= SINGULAR_THRESHOLD {
        Vector3::new(
            r[(2, 1)].atan2(r[(2, 2)]),
            (-r[(2, 0)]).atan2(sy),
            r[(1, 0)].atan2(r[(0, 0)]),
        )
    } else {
        Vector3::new((-r[(1, 2)]).atan2(r[(1, 1)]), (-r[(2, 0)]).atan2(sy), 0.0)
    }
}

/// Residual rotation `R_a * R_bᵀ`; identity when both rotations agree.
pub fn residual_rotation(r_a: &Matrix3<f64>, r_b: &Matrix3<f64>) -> Matrix3<f64> {
    r_a * r_b.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    #[test]
    fn test_euler_identity() {
        let euler = rotation_to_euler(&Matrix3::identity());
        assert_relative_eq!(euler, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_euler_recovers_zyx_angles() {
        let (x, y, z) = (0.1, -0.4, 1.2);
        let r = Rotation3::from_euler_angles(x, y, z).into_inner();

        let euler = rotation_to_euler(&r);
        assert_relative_eq!(euler, Vector3::new(x, y, z), epsilon = 1e-10);
    }

    #[test]
    fn test_euler_singular_pitch() {
        let r = Rotation3::from_euler_angles(0.3, std::f64::consts::FRAC_PI_2, 0.0).into_inner();
        let euler = rotation_to_euler(&r);

        assert_relative_eq!(euler.y, std::f64::consts::FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(euler.z, 0.0);
    }

    #[test]
    fn test_residual_of_equal_rotations_is_identity() {
        let r = Rotation3::from_euler_angles(0.5, 0.2, -0.7).into_inner();
        assert_relative_eq!(residual_rotation(&r, &r), Matrix3::identity(), epsilon = 1e-12);
    }
}
