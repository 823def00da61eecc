//! Simulated multi-map SLAM backend.
//!
//! Stands in for a real estimator in the replay binary and in tests. Each
//! tracked frame is stored relative to a reference keyframe, so the
//! trajectory of a map always reflects the current keyframe poses: moving
//! keyframes (loop correction, merge alignment) moves the trajectory and
//! every anchor attached to those keyframes together.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::{UnitQuaternion, Vector3};
use parking_lot::RwLock;
use rand::prelude::*;
use tracing::{debug, info, warn};

use crate::atlas::{KeyFrameHandle, KeyFrameId, MapIndex, PoseSource};
use crate::geometry::SE3;
use crate::system::{FrameAvailable, LoopClosureDetected, SlamBackend, SparseMapMerged};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// A new keyframe is created every this many frames.
    pub keyframe_interval: usize,

    /// Std-dev-like bound of the per-frame translation drift (m).
    pub translation_drift: f64,

    /// Bound of the per-frame yaw drift (rad).
    pub yaw_drift: f64,

    /// RNG seed, for reproducible runs.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: 5,
            translation_drift: 0.002,
            yaw_drift: 0.0005,
            seed: 7,
        }
    }
}

/// A frame stored relative to its reference keyframe.
struct SimFrame {
    keyframe: Arc<KeyFrameHandle>,
    t_kc: SE3,
}

impl SimFrame {
    fn world_pose(&self) -> SE3 {
        self.keyframe.pose().compose(&self.t_kc)
    }
}

#[derive(Default)]
struct SimMap {
    frames: Vec<SimFrame>,
    keyframes: Vec<Arc<KeyFrameHandle>>,
}

struct SimState {
    active: MapIndex,
    maps: BTreeMap<MapIndex, SimMap>,
    next_map: MapIndex,
    next_keyframe: u64,
    next_frame: u64,
    /// Accumulated estimation error applied on top of the true pose.
    drift: SE3,
    rng: StdRng,
}

/// Scripted backend with keyframes, drift, loop correction and merging.
pub struct SimulatedBackend {
    config: SimConfig,
    state: RwLock<SimState>,
    reset: AtomicBool,
}

impl SimulatedBackend {
    pub fn new(config: SimConfig) -> Arc<Self> {
        let mut maps = BTreeMap::new();
        maps.insert(0, SimMap::default());
        let rng = StdRng::seed_from_u64(config.seed);
        Arc::new(Self {
            config,
            state: RwLock::new(SimState {
                active: 0,
                maps,
                next_map: 1,
                next_keyframe: 0,
                next_frame: 0,
                drift: SE3::identity(),
                rng,
            }),
            reset: AtomicBool::new(false),
        })
    }

    /// Track one frame whose true pose is `t_wc_true`.
    ///
    /// The estimate carries the accumulated drift. Returns the notification
    /// to publish.
    pub fn track(&self, timestamp_ns: u64, t_wc_true: &SE3) -> FrameAvailable {
        let mut state = self.state.write();
        let state = &mut *state;

        let step = random_step(&mut state.rng, &self.config);
        state.drift = step.compose(&state.drift);
        let t_wc = state.drift.compose(t_wc_true);

        let frame_id = state.next_frame;
        state.next_frame += 1;

        let map_index = state.active;
        let map = state.maps.entry(map_index).or_default();
        let needs_keyframe = map.frames.len() % self.config.keyframe_interval.max(1) == 0;
        let reuse = if needs_keyframe {
            None
        } else {
            map.keyframes.last().cloned()
        };
        let keyframe = match reuse {
            Some(kf) => kf,
            None => {
                let kf = KeyFrameHandle::new(KeyFrameId::new(state.next_keyframe), t_wc);
                state.next_keyframe += 1;
                debug!("New keyframe {} in map {}", kf.keyframe_id(), map_index);
                map.keyframes.push(Arc::clone(&kf));
                kf
            }
        };

        let t_kc = keyframe.pose().inverse().compose(&t_wc);
        map.frames.push(SimFrame {
            keyframe: Arc::clone(&keyframe),
            t_kc,
        });

        FrameAvailable {
            frame_id,
            timestamp_ns,
            t_wc,
            map_index,
            keyframe: Some(keyframe as Arc<dyn PoseSource>),
            t_kc,
            placements: Vec::new(),
        }
    }

    /// Lose tracking and start a fresh map. Returns its index.
    pub fn start_new_map(&self) -> MapIndex {
        let mut state = self.state.write();
        let index = state.next_map;
        state.next_map += 1;
        state.maps.insert(index, SimMap::default());
        let previous = std::mem::replace(&mut state.active, index);
        info!("Tracking lost in map {}, starting map {}", previous, index);
        index
    }

    /// Remove the accumulated drift from the active map by moving its
    /// keyframes. Returns the notification to publish.
    pub fn close_loop(&self) -> LoopClosureDetected {
        let mut state = self.state.write();
        let correction = state.drift.inverse();
        state.drift = SE3::identity();
        let active = state.active;
        if let Some(map) = state.maps.get(&active) {
            for kf in &map.keyframes {
                kf.apply_correction(&correction);
            }
            info!(
                "Loop closed in map {}: {} keyframes corrected",
                active,
                map.keyframes.len()
            );
        }
        LoopClosureDetected
    }

    /// Apply an explicit correction to every keyframe of the active map.
    pub fn correct_active_map(&self, correction: &SE3) -> LoopClosureDetected {
        let state = self.state.read();
        if let Some(map) = state.maps.get(&state.active) {
            for kf in &map.keyframes {
                kf.apply_correction(correction);
            }
        }
        LoopClosureDetected
    }

    /// Merge `deleted` into `surviving`, moving the deleted map's keyframes
    /// by `t_sd` (deleted-map world into surviving-map world). The merged
    /// map becomes active.
    ///
    /// Returns `None` if either map does not exist or they are the same.
    pub fn merge(
        &self,
        deleted: MapIndex,
        surviving: MapIndex,
        t_sd: &SE3,
    ) -> Option<SparseMapMerged> {
        let mut state = self.state.write();
        if deleted == surviving || !state.maps.contains_key(&surviving) {
            warn!("Cannot merge map {} into {}", deleted, surviving);
            return None;
        }
        let absorbed = state.maps.remove(&deleted)?;
        for kf in &absorbed.keyframes {
            kf.apply_correction(t_sd);
        }

        let target = state.maps.entry(surviving).or_default();
        target.frames.extend(absorbed.frames);
        target.keyframes.extend(absorbed.keyframes);
        state.active = surviving;

        info!("Merged map {} into {}", deleted, surviving);
        Some(SparseMapMerged { deleted, surviving })
    }

    /// Mark a keyframe as culled. Anchors attached to it go stale.
    pub fn cull_keyframe(&self, id: KeyFrameId) -> bool {
        let state = self.state.read();
        let found = state
            .maps
            .values()
            .flat_map(|m| m.keyframes.iter())
            .find(|kf| kf.keyframe_id() == id);
        match found {
            Some(kf) => {
                kf.set_bad();
                true
            }
            None => false,
        }
    }

    pub fn set_reset(&self, value: bool) {
        self.reset.store(value, Ordering::SeqCst);
    }

    /// Map indices currently alive in the backend.
    pub fn map_indices(&self) -> Vec<MapIndex> {
        self.state.read().maps.keys().copied().collect()
    }

    pub fn num_keyframes(&self, map_index: MapIndex) -> usize {
        self.state
            .read()
            .maps
            .get(&map_index)
            .map_or(0, |m| m.keyframes.len())
    }
}

impl SlamBackend for SimulatedBackend {
    fn active_map_index(&self) -> MapIndex {
        self.state.read().active
    }

    fn trajectory(&self, map_index: MapIndex) -> Vec<SE3> {
        self.state
            .read()
            .maps
            .get(&map_index)
            .map(|m| m.frames.iter().map(SimFrame::world_pose).collect())
            .unwrap_or_default()
    }

    fn is_reset(&self) -> bool {
        self.reset.load(Ordering::SeqCst)
    }
}

fn random_step(rng: &mut StdRng, config: &SimConfig) -> SE3 {
    let t = config.translation_drift;
    let yaw = config.yaw_drift;
    let translation = if t > 0.0 {
        Vector3::new(rng.gen_range(-t..t), rng.gen_range(-t..t), rng.gen_range(-t..t))
    } else {
        Vector3::zeros()
    };
    let angle = if yaw > 0.0 { rng.gen_range(-yaw..yaw) } else { 0.0 };
    SE3::new(UnitQuaternion::from_euler_angles(0.0, 0.0, angle), translation)
}

/// True pose along a circle of `radius` in the x-y plane, facing along the
/// tangent, `steps` frames per revolution.
pub fn circle_pose(step: usize, steps: usize, radius: f64) -> SE3 {
    let theta = std::f64::consts::TAU * step as f64 / steps.max(1) as f64;
    SE3::new(
        UnitQuaternion::from_euler_angles(0.0, 0.0, theta + std::f64::consts::FRAC_PI_2),
        Vector3::new(radius * theta.cos(), radius * theta.sin(), 0.0),
    )
}
