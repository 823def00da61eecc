//! Anchor table - AR objects attached to keyframes.
//!
//! An anchor stores the keyframe it was placed on and the fixed transform
//! from that keyframe to the object (T_ka). Its world pose is recomputed on
//! every read as `T_wk ∘ T_ka`, so loop closure and map merge move anchors
//! along with their keyframes without any anchor-side update.
//!
//! Keyframes are referenced weakly. When a keyframe can no longer be
//! resolved (dropped, or flagged bad by the backend) the anchor keeps the
//! last pose it resolved to and is reported as stale; it is never removed.
//! Anchors placed on a frame without a keyframe are fixed in the world at
//! their placement pose.

use std::sync::{Arc, Weak};

use nalgebra::Vector3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::SE3;

use super::keyframe::PoseSource;
use super::types::{AnchorId, KeyFrameId};

/// Kind of placed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    /// Regular AR cube.
    Cube,
    /// Small marker used to measure drift between revisits of a spot.
    ErrorMarker,
}

/// Visual attributes of an anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualSpec {
    pub kind: AnchorKind,
    /// Box edge lengths (x, y, z) in meters.
    pub size: Vector3<f64>,
}

impl VisualSpec {
    /// Axis-aligned cube with the given edge length.
    pub fn cube(kind: AnchorKind, edge: f64) -> Self {
        Self {
            kind,
            size: Vector3::repeat(edge),
        }
    }

    pub fn half_extents(&self) -> Vector3<f64> {
        self.size * 0.5
    }
}

/// Default object sizes per anchor kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorStyle {
    /// Edge length of a regular cube (m).
    #[serde(default = "default_cube_size")]
    pub cube_size: f64,

    /// Edge length of an error marker (m).
    #[serde(default = "default_marker_size")]
    pub marker_size: f64,
}

fn default_cube_size() -> f64 {
    0.1
}

fn default_marker_size() -> f64 {
    0.05
}

impl Default for AnchorStyle {
    fn default() -> Self {
        Self {
            cube_size: default_cube_size(),
            marker_size: default_marker_size(),
        }
    }
}

impl AnchorStyle {
    pub fn spec(&self, kind: AnchorKind) -> VisualSpec {
        match kind {
            AnchorKind::Cube => VisualSpec::cube(kind, self.cube_size),
            AnchorKind::ErrorMarker => VisualSpec::cube(kind, self.marker_size),
        }
    }
}

/// An anchor's resolved pose at read time.
#[derive(Debug, Clone, Copy)]
pub struct AnchorPose {
    pub id: AnchorId,
    pub spec: VisualSpec,
    /// Anchor-to-world transform (T_wa).
    pub pose: SE3,
    /// The keyframe could not be resolved; `pose` is the last known one.
    pub stale: bool,
}

#[derive(Debug, Clone, Copy)]
struct Resolution {
    pose: SE3,
    stale: bool,
}

/// A placed AR object.
pub struct Anchor {
    id: AnchorId,
    keyframe_id: Option<KeyFrameId>,
    keyframe: Option<Weak<dyn PoseSource>>,
    /// Keyframe-to-anchor transform (T_ka), fixed at placement.
    t_ka: SE3,
    spec: VisualSpec,
    /// World pose at placement time (T_wa).
    placement_pose: SE3,
    /// Fallback for when the keyframe stops resolving.
    last_resolved: Mutex<Resolution>,
}

impl Anchor {
    pub fn id(&self) -> AnchorId {
        self.id
    }

    pub fn spec(&self) -> VisualSpec {
        self.spec
    }

    pub fn keyframe_id(&self) -> Option<KeyFrameId> {
        self.keyframe_id
    }

    pub fn relative_transform(&self) -> SE3 {
        self.t_ka
    }

    pub fn placement_pose(&self) -> SE3 {
        self.placement_pose
    }

    /// Whether the last read could not resolve the keyframe.
    pub fn is_stale(&self) -> bool {
        self.last_resolved.lock().stale
    }

    /// Compute the current world pose from the keyframe.
    pub fn resolve(&self) -> AnchorPose {
        let mut last = self.last_resolved.lock();

        if let Some(keyframe) = &self.keyframe {
            match keyframe.upgrade().and_then(|kf| kf.world_pose()) {
                Some(t_wk) => {
                    if last.stale {
                        debug!("Anchor {} keyframe resolves again", self.id);
                    }
                    last.pose = t_wk.compose(&self.t_ka);
                    last.stale = false;
                }
                None => {
                    if !last.stale {
                        warn!(
                            "Anchor {} lost its keyframe {:?}, keeping last known pose",
                            self.id, self.keyframe_id
                        );
                    }
                    last.stale = true;
                }
            }
        }

        AnchorPose {
            id: self.id,
            spec: self.spec,
            pose: last.pose,
            stale: last.stale,
        }
    }
}

/// Storage for all anchors placed during the session.
#[derive(Default)]
pub struct AnchorTable {
    anchors: Vec<Anchor>,
    next_id: u64,
}

impl AnchorTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Place an anchor on a keyframe.
    ///
    /// The placement snapshot is the keyframe's current pose composed with
    /// `t_ka`. If the keyframe does not resolve right now there is no world
    /// pose to snapshot: the anchor starts out stale at the world origin.
    /// Callers that know where the object was placed use
    /// [`place_anchor_at`](Self::place_anchor_at) instead.
    pub fn place_anchor(
        &mut self,
        keyframe: &Arc<dyn PoseSource>,
        t_ka: SE3,
        spec: VisualSpec,
    ) -> AnchorId {
        let (placement_pose, stale) = match keyframe.world_pose() {
            Some(t_wk) => (t_wk.compose(&t_ka), false),
            None => {
                warn!(
                    "Keyframe {} does not resolve, anchor placed stale at origin",
                    keyframe.keyframe_id()
                );
                (SE3::identity(), true)
            }
        };
        self.insert(Some(keyframe), t_ka, spec, placement_pose, stale)
    }

    /// Place an anchor on a keyframe with an externally observed placement pose
    /// (the camera pose of the frame the user clicked on).
    pub fn place_anchor_at(
        &mut self,
        keyframe: &Arc<dyn PoseSource>,
        t_ka: SE3,
        spec: VisualSpec,
        placement_pose: SE3,
    ) -> AnchorId {
        self.insert(Some(keyframe), t_ka, spec, placement_pose, false)
    }

    /// Place an anchor fixed in the world, not attached to any keyframe.
    pub fn place_fixed(&mut self, world_pose: SE3, spec: VisualSpec) -> AnchorId {
        self.insert(None, SE3::identity(), spec, world_pose, false)
    }

    fn insert(
        &mut self,
        keyframe: Option<&Arc<dyn PoseSource>>,
        t_ka: SE3,
        spec: VisualSpec,
        placement_pose: SE3,
        stale: bool,
    ) -> AnchorId {
        let id = AnchorId::new(self.next_id);
        self.next_id += 1;

        let keyframe_id = keyframe.map(|kf| kf.keyframe_id());
        debug!("Placing anchor {} ({:?}) on {:?}", id, spec.kind, keyframe_id);

        self.anchors.push(Anchor {
            id,
            keyframe_id,
            keyframe: keyframe.map(Arc::downgrade),
            t_ka,
            spec,
            placement_pose,
            last_resolved: Mutex::new(Resolution {
                pose: placement_pose,
                stale,
            }),
        });
        id
    }

    /// Look up an anchor by id.
    pub fn get(&self, id: AnchorId) -> Option<&Anchor> {
        // Ids are dense and assigned in push order.
        usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.anchors.get(idx))
            .filter(|a| a.id == id)
    }

    /// Current world pose of an anchor (T_wk ∘ T_ka), evaluated fresh.
    pub fn current_world_pose(&self, id: AnchorId) -> Option<SE3> {
        self.get(id).map(|a| a.resolve().pose)
    }

    /// Resolve every anchor, in placement order.
    pub fn anchor_poses(&self) -> Vec<AnchorPose> {
        self.anchors.iter().map(Anchor::resolve).collect()
    }

    /// Iterate over anchors in placement order.
    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }
}
