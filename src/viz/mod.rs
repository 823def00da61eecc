//! Render-side view of the scene.

pub mod rerun;
pub mod snapshot;

pub use snapshot::{RenderSnapshot, VisiblePath};
