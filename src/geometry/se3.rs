//! SE3: 6-DOF rigid body transformation (rotation + translation).
//!
//! Poses follow the `T_target_source` naming convention: `T_wc` maps a point
//! from the camera frame into the world frame, `T_kc` from the camera frame
//! into a keyframe's frame, and so on. Composition reads right to left:
//! `T_wa = T_wk.compose(&T_ka)`.

use std::ops::Mul;

use nalgebra::{Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Rigid transformation: p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from a rotation and a translation.
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Construct from rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix(&rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from homogeneous 4x4 matrix of form [R | t; 0 | 1].
    pub fn from_matrix(mat: &Matrix4<f64>) -> Self {
        let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(r, t)
    }

    /// Convert to homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        nalgebra::Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
            .to_homogeneous()
    }

    /// Rotation as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Inverse transformation: [R^T | -R^T t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a single point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Relative transform taking `self` to `other`: self⁻¹ ∘ other.
    pub fn between(&self, other: &SE3) -> Self {
        self.inverse().compose(other)
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: SE3) -> SE3 {
        self.compose(&rhs)
    }
}

impl Mul<&SE3> for &SE3 {
    type Output = SE3;

    fn mul(self, rhs: &SE3) -> SE3 {
        self.compose(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn yaw(angle: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle)
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let t = SE3::new(yaw(0.7), Vector3::new(1.0, -2.0, 0.5));
        let id = t.compose(&t.inverse());

        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(id.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_order() {
        // Rotate 90° about z, then translate along the rotated x axis.
        let t_wk = SE3::new(yaw(FRAC_PI_2), Vector3::new(1.0, 0.0, 0.0));
        let t_ka = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let t_wa = t_wk * t_ka;

        assert_relative_eq!(t_wa.translation, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_conversion() {
        let t = SE3::new(yaw(-0.3), Vector3::new(0.1, 0.2, 0.3));
        let back = SE3::from_matrix(&t.to_matrix());

        assert_relative_eq!(back.translation, t.translation, epsilon = 1e-12);
        assert_relative_eq!(back.rotation_matrix(), t.rotation_matrix(), epsilon = 1e-12);
    }

    #[test]
    fn test_between() {
        let a = SE3::new(yaw(0.2), Vector3::new(1.0, 0.0, 0.0));
        let b = SE3::new(yaw(0.9), Vector3::new(0.0, 3.0, 1.0));
        let rel = a.between(&b);

        let b_again = a.compose(&rel);
        assert_relative_eq!(b_again.translation, b.translation, epsilon = 1e-12);
    }
}
