//! Scene synchronization and notification dispatch.
//!
//! This module contains the top-level `ViewerSystem`, the shared scene
//! store, the synchronizer that applies SLAM notifications to it, and the
//! plumbing that delivers those notifications inline or through a worker
//! thread.

pub mod backend;
pub mod dispatcher;
pub mod messages;
pub mod shared_state;
pub mod synchronizer;
mod viewer_system;
pub mod worker;

pub use backend::SlamBackend;
pub use dispatcher::{EventHub, HandlerSlots};
pub use messages::{FrameAvailable, LoopClosureDetected, SlamEvent, SparseMapMerged};
pub use shared_state::{Scene, SceneState};
pub use synchronizer::{PlacementTrigger, SceneSynchronizer, SyncStats};
pub use viewer_system::ViewerSystem;
pub use worker::{DispatchError, EventSender, EventWorker, EventWorkerConfig};
