//! Session evaluation helpers.

pub mod drift;

pub use drift::{DriftRecorder, DriftReport};
