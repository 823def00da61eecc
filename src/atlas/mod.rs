//! Atlas module - multi-map scene stores.
//!
//! The atlas mirrors the backend's multi-map layout on the viewer side:
//! - [`PathRegistry`] - one trajectory polyline per map index, with an
//!   active map and a policy for maps that stop being active
//! - [`AnchorTable`] - AR objects attached to backend keyframes through
//!   [`PoseSource`] handles
//!
//! Neither store is synchronized on its own; both live inside
//! [`SceneState`](crate::system::SceneState), which owns the lock.

pub mod anchor_table;
pub mod keyframe;
pub mod path_registry;
pub mod types;

// Re-export commonly used types
pub use anchor_table::{AnchorKind, AnchorPose, AnchorStyle, AnchorTable, VisualSpec};
pub use keyframe::{KeyFrameHandle, PoseSource};
pub use path_registry::{
    InactiveMapPolicy, PathColor, PathRegistry, PathRegistryConfig, PathState, TrajectoryPath,
};
pub use types::{AnchorId, KeyFrameId, MapIndex};
