//! Drift measurement from error markers.
//!
//! The operator drops an error marker at a recognizable spot, walks a loop
//! and drops another one at the same spot. The camera poses recorded at the
//! first and last marker should coincide; whatever differs is accumulated
//! drift that loop closure failed to remove.

use std::fmt;

use nalgebra::{Matrix3, Vector3};

use crate::geometry::{SE3, residual_rotation, rotation_to_euler};

/// Pose difference between the first and last error marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftReport {
    /// `R_start * R_endᵀ`.
    pub residual_rotation: Matrix3<f64>,
    /// Euler angles of the residual rotation, in degrees.
    pub euler_deg: Vector3<f64>,
    /// Rotation angle of the residual, in degrees.
    pub rotation_angle_deg: f64,
    /// `‖t_end − t_start‖` in meters.
    pub translation_error: f64,
}

impl DriftReport {
    /// Compare two camera poses (T_wc).
    pub fn between(start: &SE3, end: &SE3) -> Self {
        let residual = residual_rotation(&start.rotation_matrix(), &end.rotation_matrix());
        let euler_deg = rotation_to_euler(&residual).map(f64::to_degrees);
        let rotation_angle_deg = start.rotation.angle_to(&end.rotation).to_degrees();

        Self {
            residual_rotation: residual,
            euler_deg,
            rotation_angle_deg,
            translation_error: (end.translation - start.translation).norm(),
        }
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Euler angle rotation error (deg): x: {:.4}; y: {:.4}; z: {:.4}",
            self.euler_deg.x, self.euler_deg.y, self.euler_deg.z
        )?;
        writeln!(f, "Rotation residual angle (deg): {:.4}", self.rotation_angle_deg)?;
        write!(f, "Translation error (m): {:.4}", self.translation_error)
    }
}

/// Camera poses captured whenever an error marker is placed.
#[derive(Debug, Default, Clone)]
pub struct DriftRecorder {
    markers: Vec<SE3>,
}

impl DriftRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the camera pose (T_wc) of a marker placement.
    pub fn record(&mut self, t_wc: SE3) {
        self.markers.push(t_wc);
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn markers(&self) -> &[SE3] {
        &self.markers
    }

    /// Drift between the first and the last marker.
    ///
    /// `None` until at least one marker was recorded; a single marker
    /// compares against itself and reports zero drift.
    pub fn report(&self) -> Option<DriftReport> {
        let first = self.markers.first()?;
        let last = self.markers.last()?;
        Some(DriftReport::between(first, last))
    }
}
