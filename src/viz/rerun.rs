//! Rerun-based rendering of the synchronized scene.
//!
//! Entity hierarchy:
//!     status               - Active map, frame id and reset state
//!     world/
//!         camera           - Current camera pose
//!         paths/map_{i}    - One line strip per visible map trajectory
//!         anchors/A{id}    - Anchor transform with its box underneath

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rerun::{RecordingStream, external::glam};

use crate::atlas::{AnchorKind, AnchorPose, MapIndex, PathColor};
use crate::config::VisualizationSection;
use crate::geometry::SE3;

use super::snapshot::RenderSnapshot;

/// Color of stale anchors, whose keyframe the backend culled.
const STALE_ANCHOR_COLOR: [u8; 3] = [128, 128, 128];

pub struct RerunVisualizer {
    rec: RecordingStream,
    /// Paths drawn by the previous `log_snapshot`.
    drawn_paths: BTreeSet<MapIndex>,
}

impl RerunVisualizer {
    /// Spawn a viewer, or record to the configured `.rrd` file.
    pub fn new(config: &VisualizationSection) -> Result<Self> {
        let builder = rerun::RecordingStreamBuilder::new(config.app_id.as_str());
        let rec = match &config.save_path {
            Some(path) => builder
                .save(path)
                .with_context(|| format!("Failed to create recording {}", path))?,
            None => builder.spawn().context("Failed to spawn rerun viewer")?,
        };
        Ok(Self::from_stream(rec))
    }

    /// Wrap an existing recording stream.
    pub fn from_stream(rec: RecordingStream) -> Self {
        rec.log_static("world", &rerun::ViewCoordinates::RFU()).ok();
        Self {
            rec,
            drawn_paths: BTreeSet::new(),
        }
    }

    /// Set the frame timeline for subsequent logs.
    pub fn set_frame(&self, frame_id: u64) {
        self.rec
            .set_time("frame", rerun::TimeCell::from_sequence(frame_id as i64));
    }

    /// Draw one snapshot. Paths that were drawn before but are no longer
    /// visible are cleared.
    pub fn log_snapshot(&mut self, snapshot: &RenderSnapshot) {
        if let Some(frame_id) = snapshot.frame_id {
            self.set_frame(frame_id);
        }

        let visible: BTreeSet<MapIndex> = snapshot.paths.iter().map(|p| p.map_index).collect();
        for gone in self.drawn_paths.difference(&visible) {
            self.rec
                .log(path_entity(*gone).as_str(), &rerun::Clear::flat())
                .ok();
        }

        for path in &snapshot.paths {
            let pts: Vec<[f32; 3]> = path
                .points
                .iter()
                .map(|p| [p.x as f32, p.y as f32, p.z as f32])
                .collect();
            self.rec
                .log(
                    path_entity(path.map_index).as_str(),
                    &rerun::LineStrips3D::new([pts])
                        .with_colors([color_u8(path.color)])
                        .with_radii([0.005f32]),
                )
                .ok();
        }
        self.drawn_paths = visible;

        for anchor in &snapshot.anchors {
            self.log_anchor(anchor);
        }

        if let Some(pose) = &snapshot.camera_pose {
            self.log_camera_pose(pose);
        }

        self.rec
            .log(
                "status",
                &rerun::TextDocument::new(snapshot.status_message())
                    .with_media_type(rerun::MediaType::markdown()),
            )
            .ok();
    }

    fn log_anchor(&self, anchor: &AnchorPose) {
        let entity = format!("world/anchors/{}", anchor.id);
        let (translation, rotation) = to_glam(&anchor.pose);
        self.rec
            .log(
                entity.as_str(),
                &rerun::Transform3D::from_translation_rotation(translation, rotation),
            )
            .ok();

        let h = anchor.spec.half_extents();
        let color = if anchor.stale {
            STALE_ANCHOR_COLOR
        } else {
            match anchor.spec.kind {
                AnchorKind::Cube => [0, 100, 255],
                AnchorKind::ErrorMarker => [255, 60, 0],
            }
        };
        let box_entity = format!("{}/box", entity);
        self.rec
            .log(
                box_entity.as_str(),
                &rerun::Boxes3D::from_half_sizes([[h.x as f32, h.y as f32, h.z as f32]])
                    .with_colors([color]),
            )
            .ok();
    }

    /// Log current camera pose.
    pub fn log_camera_pose(&self, pose: &SE3) {
        let (translation, rotation) = to_glam(pose);
        self.rec
            .log(
                "world/camera",
                &rerun::Transform3D::from_translation_rotation(translation, rotation),
            )
            .ok();
    }

    /// Paths drawn by the last snapshot.
    pub fn drawn_paths(&self) -> impl Iterator<Item = MapIndex> + '_ {
        self.drawn_paths.iter().copied()
    }
}

fn path_entity(map_index: MapIndex) -> String {
    format!("world/paths/map_{}", map_index)
}

fn color_u8(color: PathColor) -> [u8; 3] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn to_glam(pose: &SE3) -> (glam::Vec3, glam::Quat) {
    let t = &pose.translation;
    let q = &pose.rotation;
    (
        glam::Vec3::new(t.x as f32, t.y as f32, t.z as f32),
        glam::Quat::from_xyzw(
            q.coords.x as f32,
            q.coords.y as f32,
            q.coords.z as f32,
            q.w as f32,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viz::snapshot::VisiblePath;
    use nalgebra::Vector3;

    fn path(map_index: MapIndex) -> VisiblePath {
        VisiblePath {
            map_index,
            color: [1.0, 0.0, 0.0],
            points: vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)],
        }
    }

    #[test]
    fn test_color_conversion() {
        assert_eq!(color_u8([1.0, 0.0, 0.5]), [255, 0, 128]);
        assert_eq!(color_u8([2.0, -1.0, 0.0]), [255, 0, 0]);
    }

    #[test]
    fn test_vanished_paths_are_forgotten() {
        let (rec, _storage) = rerun::RecordingStreamBuilder::new("test")
            .memory()
            .unwrap();
        let mut viz = RerunVisualizer::from_stream(rec);

        viz.log_snapshot(&RenderSnapshot {
            paths: vec![path(0), path(1)],
            ..Default::default()
        });
        assert_eq!(viz.drawn_paths().collect::<Vec<_>>(), vec![0, 1]);

        viz.log_snapshot(&RenderSnapshot {
            paths: vec![path(1)],
            ..Default::default()
        });
        assert_eq!(viz.drawn_paths().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_snapshot_with_frame_id_sets_timeline() {
        let (rec, _storage) = rerun::RecordingStreamBuilder::new("test")
            .memory()
            .unwrap();
        let mut viz = RerunVisualizer::from_stream(rec);

        viz.log_snapshot(&RenderSnapshot {
            frame_id: Some(42),
            paths: vec![path(3)],
            ..Default::default()
        });
        viz.set_frame(43);
        assert_eq!(viz.drawn_paths().collect::<Vec<_>>(), vec![3]);
    }
}
