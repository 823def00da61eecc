pub mod trajectory;

pub use trajectory::{PoseEntry, load_pose_csv};
