//! Keyframe pose access.
//!
//! Keyframes belong to the SLAM backend. Their world poses are rewritten by
//! loop closure, map merge and global optimization at any time, so anything
//! displayed relative to a keyframe must re-read the pose instead of copying
//! it. [`PoseSource`] is the only view of a keyframe this crate depends on.
//!
//! [`KeyFrameHandle`] is a ready-made implementation for backends that do not
//! already have a thread-safe keyframe type: the pose lives behind its own
//! `RwLock`, so corrections from the backend thread and reads from the
//! render thread never tear.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::geometry::SE3;

use super::types::KeyFrameId;

/// Capability to read a keyframe's current world pose.
///
/// Implementations must be safe to read while the backend concurrently
/// corrects the pose.
pub trait PoseSource: Send + Sync {
    /// Stable identity of the keyframe.
    fn keyframe_id(&self) -> KeyFrameId;

    /// Current keyframe-to-world transform (T_wk).
    ///
    /// Returns `None` once the backend has discarded the keyframe.
    fn world_pose(&self) -> Option<SE3>;
}

/// A keyframe pose cell shared between the backend and the viewer.
#[derive(Debug)]
pub struct KeyFrameHandle {
    id: KeyFrameId,

    /// T_wk, rewritten by the backend after optimization.
    pose: RwLock<SE3>,

    /// Set when the backend culls the keyframe.
    is_bad: AtomicBool,
}

impl KeyFrameHandle {
    /// Create a new handle at the given world pose.
    pub fn new(id: KeyFrameId, pose: SE3) -> Arc<Self> {
        Arc::new(Self {
            id,
            pose: RwLock::new(pose),
            is_bad: AtomicBool::new(false),
        })
    }

    /// Current pose regardless of the bad flag.
    pub fn pose(&self) -> SE3 {
        *self.pose.read()
    }

    /// Overwrite the world pose.
    pub fn set_pose(&self, pose: SE3) {
        *self.pose.write() = pose;
    }

    /// Left-multiply the world pose by a world-frame correction
    /// (T_wk ← T_corr ∘ T_wk), as done by loop correction and map merge.
    pub fn apply_correction(&self, correction: &SE3) {
        let mut pose = self.pose.write();
        *pose = correction.compose(&pose);
    }

    /// Mark the keyframe as discarded by the backend.
    pub fn set_bad(&self) {
        self.is_bad.store(true, Ordering::SeqCst);
    }

    /// Check if the keyframe was discarded.
    pub fn is_bad(&self) -> bool {
        self.is_bad.load(Ordering::SeqCst)
    }
}

impl PoseSource for KeyFrameHandle {
    fn keyframe_id(&self) -> KeyFrameId {
        self.id
    }

    fn world_pose(&self) -> Option<SE3> {
        if self.is_bad() {
            None
        } else {
            Some(self.pose())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_world_pose_follows_set_pose() {
        let kf = KeyFrameHandle::new(KeyFrameId::new(1), SE3::identity());
        kf.set_pose(SE3::from_translation(Vector3::new(1.0, 2.0, 3.0)));

        let pose = kf.world_pose().unwrap();
        assert_relative_eq!(pose.translation, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_correction_is_left_multiplied() {
        let kf = KeyFrameHandle::new(
            KeyFrameId::new(2),
            SE3::from_translation(Vector3::new(1.0, 0.0, 0.0)),
        );
        kf.apply_correction(&SE3::from_translation(Vector3::new(0.0, 0.5, 0.0)));

        assert_relative_eq!(kf.pose().translation, Vector3::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn test_bad_keyframe_has_no_world_pose() {
        let kf = KeyFrameHandle::new(KeyFrameId::new(3), SE3::identity());
        kf.set_bad();

        assert!(kf.is_bad());
        assert!(kf.world_pose().is_none());
        assert_eq!(kf.keyframe_id(), KeyFrameId::new(3));
    }
}
