//! Scene state shared between the SLAM callbacks and the render loop.
//!
//! `SceneState` is the single synchronized store. The path registry and the
//! anchor table sit together behind one `RwLock`, so each event mutates both
//! atomically and a render read never sees half of an event. Mutations go
//! through the methods below; nothing outside this crate can obtain a
//! mutable reference into the stores.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use nalgebra::Vector3;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::atlas::{
    AnchorId, AnchorPose, AnchorTable, MapIndex, PathRegistry, PathRegistryConfig, PoseSource,
    VisualSpec,
};
use crate::evaluation::DriftRecorder;
use crate::geometry::SE3;
use crate::viz::snapshot::{RenderSnapshot, VisiblePath};

/// Everything guarded by the scene lock.
pub struct Scene {
    pub(crate) paths: PathRegistry,
    pub(crate) anchors: AnchorTable,
    pub(crate) drift: DriftRecorder,
    /// Latest camera pose (T_wc).
    pub(crate) camera_pose: Option<SE3>,
    /// Id of the latest applied frame.
    pub(crate) last_frame_id: Option<u64>,
}

impl Scene {
    fn new(config: PathRegistryConfig) -> Self {
        Self {
            paths: PathRegistry::new(config),
            anchors: AnchorTable::new(),
            drift: DriftRecorder::new(),
            camera_pose: None,
            last_frame_id: None,
        }
    }

    pub fn paths(&self) -> &PathRegistry {
        &self.paths
    }

    pub fn anchors(&self) -> &AnchorTable {
        &self.anchors
    }

    pub fn drift(&self) -> &DriftRecorder {
        &self.drift
    }

    pub fn camera_pose(&self) -> Option<SE3> {
        self.camera_pose
    }

    pub fn last_frame_id(&self) -> Option<u64> {
        self.last_frame_id
    }

    fn visible_paths(&self) -> Vec<VisiblePath> {
        self.paths
            .drawable_paths()
            .map(|p| VisiblePath {
                map_index: p.map_index(),
                color: p.color(),
                points: p.points().to_vec(),
            })
            .collect()
    }
}

/// Shared state accessible by the pipeline and the render loop.
pub struct SceneState {
    scene: RwLock<Scene>,

    /// Mirrors the backend's reset flag for the status line.
    backend_reset: AtomicBool,

    /// Number of events applied so far.
    events_applied: AtomicU64,
}

impl SceneState {
    /// Create an empty scene.
    pub fn new(config: PathRegistryConfig) -> Arc<Self> {
        Arc::new(Self {
            scene: RwLock::new(Scene::new(config)),
            backend_reset: AtomicBool::new(false),
            events_applied: AtomicU64::new(0),
        })
    }

    /// Shared read access for inspection.
    pub fn read(&self) -> RwLockReadGuard<'_, Scene> {
        self.scene.read()
    }

    /// Exclusive access for one event's critical section.
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Scene> {
        self.scene.write()
    }

    pub(crate) fn note_event_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::SeqCst);
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied.load(Ordering::SeqCst)
    }

    pub fn set_backend_reset(&self, value: bool) {
        self.backend_reset.store(value, Ordering::SeqCst);
    }

    pub fn is_backend_reset(&self) -> bool {
        self.backend_reset.load(Ordering::SeqCst)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Path registry operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create the path for `map_index` if absent. Returns its current length.
    pub fn ensure_path(&self, map_index: MapIndex) -> usize {
        self.write().paths.ensure_path(map_index).len()
    }

    pub fn append_point(&self, map_index: MapIndex, point: Vector3<f64>) -> bool {
        self.write().paths.append_point(map_index, point)
    }

    pub fn set_active(&self, map_index: MapIndex) -> Option<MapIndex> {
        self.write().paths.set_active(map_index)
    }

    pub fn replace_trajectory(&self, map_index: MapIndex, points: Vec<Vector3<f64>>) -> usize {
        self.write().paths.replace_trajectory(map_index, points)
    }

    pub fn clear(&self, map_index: MapIndex) -> bool {
        self.write().paths.clear(map_index)
    }

    /// Points of one path, empty if the index is unknown.
    pub fn path_points(&self, map_index: MapIndex) -> Vec<Vector3<f64>> {
        self.read()
            .paths
            .get(map_index)
            .map(|p| p.points().to_vec())
            .unwrap_or_default()
    }

    pub fn active_map_index(&self) -> Option<MapIndex> {
        self.read().paths.active_index()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Anchor table operations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn place_anchor(
        &self,
        keyframe: &Arc<dyn PoseSource>,
        t_ka: SE3,
        spec: VisualSpec,
    ) -> AnchorId {
        self.write().anchors.place_anchor(keyframe, t_ka, spec)
    }

    pub fn current_world_pose(&self, id: AnchorId) -> Option<SE3> {
        self.read().anchors.current_world_pose(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Render snapshot
    // ─────────────────────────────────────────────────────────────────────────

    /// Drawable paths: visible and non-empty, ordered by map index.
    pub fn visible_paths(&self) -> Vec<VisiblePath> {
        self.read().visible_paths()
    }

    /// World poses of all anchors, resolved now.
    pub fn anchor_poses(&self) -> Vec<AnchorPose> {
        self.read().anchors.anchor_poses()
    }

    /// Consistent view of the whole scene taken under one read lock.
    pub fn snapshot(&self) -> RenderSnapshot {
        let scene = self.read();
        RenderSnapshot {
            paths: scene.visible_paths(),
            anchors: scene.anchors.anchor_poses(),
            camera_pose: scene.camera_pose,
            active_map: scene.paths.active_index(),
            frame_id: scene.last_frame_id,
            backend_reset: self.is_backend_reset(),
        }
    }
}
