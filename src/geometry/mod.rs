//! Geometry utilities: SE3 transforms and rotation helpers.

pub mod se3;
pub mod so3;

pub use se3::SE3;
pub use so3::{residual_rotation, rotation_to_euler};
