//! SceneSynchronizer - applies pipeline notifications to the scene.
//!
//! Each notification is applied inside one write-lock critical section:
//! 1. **FrameAvailable**: switch the active map if it changed, append the
//!    camera position, place the anchors requested while the frame was
//!    current
//! 2. **LoopClosureDetected**: pull the corrected trajectory of the active
//!    map from the backend and replace the path with it
//! 3. **SparseMapMerged**: retire the deleted map's path, then replace the
//!    surviving path with the backend's recomputed trajectory and show it
//!
//! Anchors are never touched by corrections. They resolve their pose from
//! their keyframe at read time, and the backend has already moved the
//! keyframes by the time it raises the notification.
//!
//! The synchronizer does not care which thread calls it; the same instance
//! serves an inline integration and the [`EventWorker`](super::EventWorker).

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use nalgebra::Vector3;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::atlas::{AnchorKind, AnchorStyle};

use super::backend::SlamBackend;
use super::dispatcher::EventHub;
use super::messages::{FrameAvailable, LoopClosureDetected, SlamEvent, SparseMapMerged};
use super::shared_state::SceneState;

/// Subscriber slot names used when registering on an [`EventHub`].
pub const FRAME_SLOT: &str = "mapping";
pub const LOOP_CLOSURE_SLOT: &str = "trajectory_update";
pub const MAP_MERGE_SLOT: &str = "merge_update";

/// Input-side handle used to request anchor placement.
///
/// Requests wait in a queue until the next frame is raised, which carries
/// them in [`FrameAvailable::placements`]. The anchor is therefore attached
/// to the frame that was current when the user asked, however late that
/// frame is applied.
#[derive(Clone)]
pub struct PlacementTrigger {
    sender: Sender<AnchorKind>,
}

impl PlacementTrigger {
    /// Queue a placement of the given kind.
    pub fn request(&self, kind: AnchorKind) {
        // The receiver lives as long as the synchronizer; after that there is
        // nobody left to place anchors for.
        if self.sender.send(kind).is_err() {
            debug!("Placement request after synchronizer shutdown ignored");
        }
    }

    /// A regular AR cube (mouse click).
    pub fn place_cube(&self) {
        self.request(AnchorKind::Cube);
    }

    /// A drift-measurement marker.
    pub fn place_error_marker(&self) {
        self.request(AnchorKind::ErrorMarker);
    }
}

/// Pending placement requests, moved onto frames as they are raised.
#[derive(Clone)]
pub(crate) struct PlacementQueue {
    tx: Sender<AnchorKind>,
    rx: Receiver<AnchorKind>,
}

impl PlacementQueue {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Move every pending request onto `event` if it is a frame.
    pub(crate) fn stamp(&self, event: &mut SlamEvent) {
        if let SlamEvent::FrameAvailable(frame) = event {
            frame.placements.extend(self.rx.try_iter());
        }
    }

    /// Put the requests of an event that could not be delivered back in
    /// the queue.
    pub(crate) fn requeue(&self, event: SlamEvent) {
        if let SlamEvent::FrameAvailable(frame) = event {
            for kind in frame.placements {
                self.tx.send(kind).ok();
            }
        }
    }
}

/// Counters for the synchronizer.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    /// Frames applied.
    pub frames: usize,

    /// Active-map switches observed.
    pub map_switches: usize,

    /// Loop-closure corrections applied.
    pub loop_closures: usize,

    /// Map merges applied.
    pub merges: usize,

    /// Anchors placed.
    pub anchors_placed: usize,
}

/// Applies pipeline notifications to a [`SceneState`].
pub struct SceneSynchronizer {
    state: Arc<SceneState>,
    backend: Arc<dyn SlamBackend>,
    style: AnchorStyle,
    placements: PlacementQueue,
    stats: Mutex<SyncStats>,
}

impl SceneSynchronizer {
    /// Create a synchronizer for `state`, pulling corrections from `backend`.
    pub fn new(state: Arc<SceneState>, backend: Arc<dyn SlamBackend>, style: AnchorStyle) -> Self {
        Self {
            state,
            backend,
            style,
            placements: PlacementQueue::new(),
            stats: Mutex::new(SyncStats::default()),
        }
    }

    pub fn state(&self) -> &Arc<SceneState> {
        &self.state
    }

    /// Handle for the input layer.
    pub fn placement_trigger(&self) -> PlacementTrigger {
        PlacementTrigger {
            sender: self.placements.tx.clone(),
        }
    }

    pub(crate) fn placement_queue(&self) -> PlacementQueue {
        self.placements.clone()
    }

    /// Attach pending placement requests to a frame about to be raised.
    ///
    /// [`ViewerSystem`](super::ViewerSystem) does this on every push; call
    /// it directly when publishing frames through an own [`EventHub`].
    pub fn stamp_placements(&self, frame: &mut FrameAvailable) {
        frame.placements.extend(self.placements.rx.try_iter());
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.lock().clone()
    }

    /// Subscribe this synchronizer to all three notification kinds.
    pub fn register(self: &Arc<Self>, hub: &mut EventHub) {
        let this = Arc::clone(self);
        hub.add_frame_available_handler(FRAME_SLOT, move |frame| this.on_frame_available(frame));

        let this = Arc::clone(self);
        hub.add_loop_closure_handler(LOOP_CLOSURE_SLOT, move |ev| this.on_loop_closure(ev));

        let this = Arc::clone(self);
        hub.add_map_merge_handler(MAP_MERGE_SLOT, move |ev| this.on_map_merged(ev));
    }

    /// Apply any notification.
    pub fn apply(&self, event: &SlamEvent) {
        match event {
            SlamEvent::FrameAvailable(frame) => self.on_frame_available(frame),
            SlamEvent::LoopClosureDetected(ev) => self.on_loop_closure(ev),
            SlamEvent::SparseMapMerged(ev) => self.on_map_merged(ev),
        }
    }

    /// Apply a tracked frame.
    pub fn on_frame_available(&self, frame: &FrameAvailable) {
        let mut stats = SyncStats::default();

        {
            let mut scene = self.state.write();

            if let Some(previous) = scene.paths.set_active(frame.map_index) {
                info!("Active map changed: {} -> {}", previous, frame.map_index);
                stats.map_switches += 1;
            }
            scene.paths.append_point(frame.map_index, frame.camera_position());
            scene.camera_pose = Some(frame.t_wc);
            scene.last_frame_id = Some(frame.frame_id);

            for &kind in &frame.placements {
                let spec = self.style.spec(kind);
                let id = match &frame.keyframe {
                    Some(keyframe) => {
                        scene
                            .anchors
                            .place_anchor_at(keyframe, frame.t_kc, spec, frame.t_wc)
                    }
                    None => scene.anchors.place_fixed(frame.t_wc, spec),
                };
                if kind == AnchorKind::ErrorMarker {
                    scene.drift.record(frame.t_wc);
                }
                stats.anchors_placed += 1;
                info!("Adding anchor {} ({:?}) at frame {}", id, kind, frame.frame_id);
            }
        }

        self.state.set_backend_reset(self.backend.is_reset());
        self.state.note_event_applied();

        let mut total = self.stats.lock();
        total.frames += 1;
        total.map_switches += stats.map_switches;
        total.anchors_placed += stats.anchors_placed;
    }

    /// Replace the active map's path with the backend's corrected trajectory.
    pub fn on_loop_closure(&self, _event: &LoopClosureDetected) {
        let (map_index, n_points) = {
            let mut scene = self.state.write();
            // Read-then-replace stays inside the lock so no frame can slip
            // an append in between.
            let map_index = self.backend.active_map_index();
            let corrected = translations(&*self.backend, map_index);
            let n_points = scene.paths.replace_trajectory(map_index, corrected);
            (map_index, n_points)
        };
        self.state.note_event_applied();
        self.stats.lock().loop_closures += 1;

        info!(
            "Loop closure: map {} trajectory replaced ({} points)",
            map_index, n_points
        );
    }

    /// Retire the deleted map and refresh the surviving one.
    pub fn on_map_merged(&self, event: &SparseMapMerged) {
        let SparseMapMerged { deleted, surviving } = *event;

        let n_points = {
            let mut scene = self.state.write();

            // Deleted first: a render read must never see both paths drawn
            // over the same space.
            if deleted == surviving {
                warn!("Merge of map {} into itself, refreshing only", deleted);
            } else if !scene.paths.mark_merged(deleted) {
                warn!("Merge names unknown map {}, nothing to clear", deleted);
            }

            let points = translations(&*self.backend, surviving);
            let n_points = scene.paths.replace_trajectory(surviving, points);

            // The survivor is drawn whatever the inactive-map policy did
            // to it earlier.
            if self.backend.active_map_index() == surviving {
                scene.paths.set_active(surviving);
            } else {
                scene.paths.show(surviving);
            }
            n_points
        };
        self.state.note_event_applied();
        self.stats.lock().merges += 1;

        info!(
            "Map {} merged into {} ({} points)",
            deleted, surviving, n_points
        );
    }
}

fn translations(backend: &dyn SlamBackend, map_index: usize) -> Vec<Vector3<f64>> {
    backend
        .trajectory(map_index)
        .iter()
        .map(|pose| pose.translation)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use approx::assert_relative_eq;

    use crate::atlas::{
        InactiveMapPolicy, KeyFrameHandle, KeyFrameId, MapIndex, PathRegistryConfig, PathState,
        PoseSource,
    };
    use crate::geometry::SE3;

    /// Backend stub with scripted trajectories.
    #[derive(Default)]
    struct ScriptedBackend {
        active: Mutex<MapIndex>,
        trajectories: Mutex<HashMap<MapIndex, Vec<SE3>>>,
    }

    impl ScriptedBackend {
        fn set_trajectory(&self, map_index: MapIndex, xs: &[f64]) {
            let poses = xs
                .iter()
                .map(|&x| SE3::from_translation(Vector3::new(x, 0.0, 0.0)))
                .collect();
            self.trajectories.lock().insert(map_index, poses);
        }
    }

    impl SlamBackend for ScriptedBackend {
        fn active_map_index(&self) -> MapIndex {
            *self.active.lock()
        }

        fn trajectory(&self, map_index: MapIndex) -> Vec<SE3> {
            self.trajectories
                .lock()
                .get(&map_index)
                .cloned()
                .unwrap_or_default()
        }
    }

    fn setup(policy: InactiveMapPolicy) -> (Arc<ScriptedBackend>, SceneSynchronizer) {
        let backend = Arc::new(ScriptedBackend::default());
        let state = SceneState::new(PathRegistryConfig {
            inactive_maps: policy,
            ..Default::default()
        });
        let sync = SceneSynchronizer::new(state, backend.clone(), AnchorStyle::default());
        (backend, sync)
    }

    fn frame(frame_id: u64, map_index: MapIndex, x: f64) -> FrameAvailable {
        FrameAvailable {
            frame_id,
            timestamp_ns: frame_id * 1000,
            t_wc: SE3::from_translation(Vector3::new(x, 0.0, 0.0)),
            map_index,
            keyframe: None,
            t_kc: SE3::identity(),
            placements: Vec::new(),
        }
    }

    fn xs(sync: &SceneSynchronizer, map_index: MapIndex) -> Vec<f64> {
        sync.state()
            .path_points(map_index)
            .iter()
            .map(|p| p.x)
            .collect()
    }

    #[test]
    fn test_frames_append_to_active_map() {
        let (_backend, sync) = setup(InactiveMapPolicy::Clear);
        for i in 0..5 {
            sync.on_frame_available(&frame(i, 0, i as f64));
        }

        assert_eq!(xs(&sync, 0), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sync.state().active_map_index(), Some(0));
        assert_eq!(sync.stats().frames, 5);
        assert_eq!(sync.state().events_applied(), 5);
    }

    #[test]
    fn test_map_switch_and_return_with_clear_policy() {
        let (_backend, sync) = setup(InactiveMapPolicy::Clear);
        sync.on_frame_available(&frame(0, 0, 1.0));
        sync.on_frame_available(&frame(1, 0, 2.0));
        sync.on_frame_available(&frame(2, 1, 10.0));
        sync.on_frame_available(&frame(3, 0, 3.0));

        assert_eq!(xs(&sync, 0), vec![3.0]);
        assert!(xs(&sync, 1).is_empty());
        assert_eq!(sync.stats().map_switches, 2);
    }

    #[test]
    fn test_loop_closure_replaces_active_path_exactly() {
        let (backend, sync) = setup(InactiveMapPolicy::Clear);
        for i in 0..20 {
            sync.on_frame_available(&frame(i, 0, i as f64));
        }

        backend.set_trajectory(0, &[0.5, 1.5, 2.5]);
        sync.on_loop_closure(&LoopClosureDetected);

        assert_eq!(xs(&sync, 0), vec![0.5, 1.5, 2.5]);
        sync.on_frame_available(&frame(20, 0, 3.5));
        assert_eq!(xs(&sync, 0), vec![0.5, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_merge_clears_deleted_and_repopulates_survivor() {
        let (backend, sync) = setup(InactiveMapPolicy::HideRetain);
        sync.on_frame_available(&frame(0, 0, 1.0));
        sync.on_frame_available(&frame(1, 1, 2.0));
        *backend.active.lock() = 1;
        backend.set_trajectory(1, &[7.0, 8.0, 9.0]);

        sync.on_map_merged(&SparseMapMerged {
            deleted: 0,
            surviving: 1,
        });

        let visible = sync.state().visible_paths();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].map_index, 1);
        assert_eq!(xs(&sync, 1), vec![7.0, 8.0, 9.0]);
        assert!(xs(&sync, 0).is_empty());
        assert_eq!(
            sync.state().read().paths().get(0).map(|p| p.state()),
            Some(PathState::Merged)
        );
    }

    #[test]
    fn test_merge_into_hidden_map_shows_survivor() {
        let (backend, sync) = setup(InactiveMapPolicy::HideRetain);
        sync.on_frame_available(&frame(0, 1, 1.0));
        sync.on_frame_available(&frame(1, 0, 2.0));
        assert!(sync.state().visible_paths().iter().all(|p| p.map_index == 0));

        *backend.active.lock() = 1;
        backend.set_trajectory(1, &[5.0, 6.0]);
        sync.on_map_merged(&SparseMapMerged {
            deleted: 0,
            surviving: 1,
        });

        let visible = sync.state().visible_paths();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].map_index, 1);
        assert_eq!(xs(&sync, 1), vec![5.0, 6.0]);
        assert_eq!(sync.state().active_map_index(), Some(1));

        sync.on_frame_available(&frame(2, 1, 7.0));
        assert_eq!(xs(&sync, 1), vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_survivor_shown_when_not_backend_active() {
        let (backend, sync) = setup(InactiveMapPolicy::HideRetain);
        sync.on_frame_available(&frame(0, 1, 1.0));
        sync.on_frame_available(&frame(1, 2, 2.0));
        sync.on_frame_available(&frame(2, 0, 3.0));

        *backend.active.lock() = 2;
        backend.set_trajectory(1, &[8.0]);
        sync.on_map_merged(&SparseMapMerged {
            deleted: 0,
            surviving: 1,
        });

        let visible: Vec<_> = sync
            .state()
            .visible_paths()
            .iter()
            .map(|p| p.map_index)
            .collect();
        assert_eq!(visible, vec![1]);
        assert_eq!(xs(&sync, 1), vec![8.0]);
    }

    #[test]
    fn test_frames_on_merged_map_are_dropped() {
        let (backend, sync) = setup(InactiveMapPolicy::Clear);
        sync.on_frame_available(&frame(0, 0, 1.0));
        *backend.active.lock() = 1;
        backend.set_trajectory(1, &[2.0]);
        sync.on_map_merged(&SparseMapMerged {
            deleted: 0,
            surviving: 1,
        });

        sync.on_frame_available(&frame(1, 0, 3.0));

        assert!(xs(&sync, 0).is_empty());
        assert_eq!(xs(&sync, 1), vec![2.0]);
        assert_eq!(sync.state().active_map_index(), Some(1));
        assert_eq!(
            sync.state().read().paths().get(0).map(|p| p.state()),
            Some(PathState::Merged)
        );
    }

    #[test]
    fn test_merge_with_unknown_deleted_index_is_tolerated() {
        let (backend, sync) = setup(InactiveMapPolicy::Clear);
        backend.set_trajectory(0, &[1.0]);

        sync.on_map_merged(&SparseMapMerged {
            deleted: 5,
            surviving: 0,
        });

        assert_eq!(xs(&sync, 0), vec![1.0]);
        assert!(sync.state().read().paths().get(5).is_none());
    }

    #[test]
    fn test_placement_request_attaches_anchor_to_frame_keyframe() {
        let (_backend, sync) = setup(InactiveMapPolicy::Clear);
        let kf = KeyFrameHandle::new(
            KeyFrameId::new(3),
            SE3::from_translation(Vector3::new(1.0, 0.0, 0.0)),
        );
        let t_kc = SE3::from_translation(Vector3::new(0.0, 2.0, 0.0));

        let mut f = frame(0, 0, 0.0);
        f.t_wc = kf.pose().compose(&t_kc);
        f.keyframe = Some(kf.clone() as Arc<dyn PoseSource>);
        f.t_kc = t_kc;

        sync.placement_trigger().place_cube();
        sync.stamp_placements(&mut f);
        sync.on_frame_available(&f);

        let poses = sync.state().anchor_poses();
        assert_eq!(poses.len(), 1);
        assert_relative_eq!(poses[0].pose.translation, Vector3::new(1.0, 2.0, 0.0));

        // Backend correction moves the anchor with the keyframe.
        kf.apply_correction(&SE3::from_translation(Vector3::new(0.0, 0.0, -1.0)));
        let poses = sync.state().anchor_poses();
        assert_relative_eq!(poses[0].pose.translation, Vector3::new(1.0, 2.0, -1.0));
    }

    #[test]
    fn test_error_marker_without_keyframe_is_fixed_and_recorded() {
        let (_backend, sync) = setup(InactiveMapPolicy::Clear);
        sync.placement_trigger().place_error_marker();
        let mut first = frame(0, 0, 4.0);
        sync.stamp_placements(&mut first);
        sync.on_frame_available(&first);
        // Requests are consumed once.
        let mut second = frame(1, 0, 5.0);
        sync.stamp_placements(&mut second);
        assert!(second.placements.is_empty());
        sync.on_frame_available(&second);

        let scene = sync.state().read();
        assert_eq!(scene.anchors().len(), 1);
        assert_eq!(scene.drift().len(), 1);
        assert_relative_eq!(
            scene.anchors().anchor_poses()[0].pose.translation,
            Vector3::new(4.0, 0.0, 0.0)
        );
        drop(scene);
        assert_eq!(sync.stats().anchors_placed, 1);
    }

    #[test]
    fn test_register_routes_hub_events() {
        let (backend, sync) = setup(InactiveMapPolicy::Clear);
        let sync = Arc::new(sync);
        let mut hub = EventHub::new();
        sync.register(&mut hub);

        hub.publish(&frame(0, 0, 1.0).into());
        backend.set_trajectory(0, &[9.0]);
        hub.publish(&LoopClosureDetected.into());

        assert_eq!(xs(&sync, 0), vec![9.0]);
        assert_eq!(hub.frame_available.names().collect::<Vec<_>>(), vec![FRAME_SLOT]);
    }
}
