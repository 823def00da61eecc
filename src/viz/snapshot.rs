//! Read-only scene view handed to the render loop.

use nalgebra::Vector3;

use crate::atlas::{AnchorPose, MapIndex, PathColor};
use crate::geometry::SE3;

/// One drawable trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct VisiblePath {
    pub map_index: MapIndex,
    pub color: PathColor,
    pub points: Vec<Vector3<f64>>,
}

/// Everything the render loop draws for one frame, taken under a single
/// read lock.
#[derive(Debug, Clone, Default)]
pub struct RenderSnapshot {
    /// Visible, non-empty paths ordered by map index.
    pub paths: Vec<VisiblePath>,

    /// Anchor world poses resolved at snapshot time.
    pub anchors: Vec<AnchorPose>,

    /// Latest camera pose (T_wc).
    pub camera_pose: Option<SE3>,

    pub active_map: Option<MapIndex>,

    /// Id of the latest applied frame.
    pub frame_id: Option<u64>,

    /// Backend reported a reset in progress.
    pub backend_reset: bool,
}

impl RenderSnapshot {
    /// Status line shown above the scene.
    pub fn status_message(&self) -> String {
        let mut status = match (self.active_map, self.frame_id) {
            (Some(map), Some(frame)) => format!("Map {} | Frame {}", map, frame),
            _ => "Waiting for frames".to_string(),
        };
        status.push_str(&format!(
            " | Paths: {} | Anchors: {}",
            self.paths.len(),
            self.anchors.len()
        ));
        if self.backend_reset {
            status.push_str(" *Reseting*");
        }
        status
    }

    /// Total number of path points to draw.
    pub fn num_points(&self) -> usize {
        self.paths.iter().map(|p| p.points.len()).sum()
    }
}
