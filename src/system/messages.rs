//! Notifications raised by the SLAM pipeline.
//!
//! Each notification kind has its own payload type so handlers can be
//! registered and tested independently. [`SlamEvent`] wraps them for
//! transport over a channel when the pipeline runs on another thread.

use std::fmt;
use std::sync::Arc;

use nalgebra::Vector3;

use crate::atlas::{AnchorKind, MapIndex, PoseSource};
use crate::geometry::SE3;

/// A tracked frame, published once per processed camera frame.
#[derive(Clone)]
pub struct FrameAvailable {
    /// Sequential frame id assigned by the pipeline.
    pub frame_id: u64,

    /// Timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Estimated camera-to-world transform (T_wc).
    pub t_wc: SE3,

    /// Map the frame was tracked in.
    pub map_index: MapIndex,

    /// Reference keyframe of this frame, if the backend has one yet.
    pub keyframe: Option<Arc<dyn PoseSource>>,

    /// Camera pose relative to the reference keyframe (T_kc).
    pub t_kc: SE3,

    /// Anchors the user asked for while this frame was current. Filled in
    /// when the frame is raised, see [`PlacementTrigger`](super::PlacementTrigger).
    pub placements: Vec<AnchorKind>,
}

impl FrameAvailable {
    /// Camera center in world coordinates.
    pub fn camera_position(&self) -> Vector3<f64> {
        self.t_wc.translation
    }
}

impl fmt::Debug for FrameAvailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameAvailable")
            .field("frame_id", &self.frame_id)
            .field("timestamp_ns", &self.timestamp_ns)
            .field("map_index", &self.map_index)
            .field("keyframe", &self.keyframe.as_ref().map(|kf| kf.keyframe_id()))
            .field("t_wc", &self.t_wc)
            .field("placements", &self.placements)
            .finish()
    }
}

/// The backend finished correcting the active map's trajectory.
///
/// Carries no payload: the corrected trajectory is pulled from the backend
/// when the event is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopClosureDetected;

/// Two maps were recognized as the same space and merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseMapMerged {
    /// Map that no longer exists.
    pub deleted: MapIndex,
    /// Map that absorbed it.
    pub surviving: MapIndex,
}

/// Any pipeline notification, in the order it was raised.
#[derive(Debug, Clone)]
pub enum SlamEvent {
    FrameAvailable(FrameAvailable),
    LoopClosureDetected(LoopClosureDetected),
    SparseMapMerged(SparseMapMerged),
}

impl SlamEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SlamEvent::FrameAvailable(_) => "frame_available",
            SlamEvent::LoopClosureDetected(_) => "loop_closure_detected",
            SlamEvent::SparseMapMerged(_) => "sparse_map_merged",
        }
    }
}

impl From<FrameAvailable> for SlamEvent {
    fn from(ev: FrameAvailable) -> Self {
        SlamEvent::FrameAvailable(ev)
    }
}

impl From<LoopClosureDetected> for SlamEvent {
    fn from(ev: LoopClosureDetected) -> Self {
        SlamEvent::LoopClosureDetected(ev)
    }
}

impl From<SparseMapMerged> for SlamEvent {
    fn from(ev: SparseMapMerged) -> Self {
        SlamEvent::SparseMapMerged(ev)
    }
}
