//! Per-map trajectory registry.
//!
//! The registry owns one [`TrajectoryPath`] per map index ever reported by
//! the backend. Exactly one index is active at a time; when the backend
//! switches maps (tracking loss, relocalization into another map) the
//! previously active path is cleared, hidden or left alone according to
//! [`InactiveMapPolicy`].
//!
//! Per-index lifecycle:
//!
//! ```text
//! Unseen ──ensure──▶ Live ──switch away──▶ Inactive ──switch back──▶ Live
//!                     │                       │
//!                     └────────merge──────────┴──▶ Merged
//! ```
//!
//! Only `Live` paths accept appends. `Merged` is final: the index is never
//! made active again. Wholesale replacement (loop closure, merge) is
//! accepted in every state since it is authoritative.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::MapIndex;

/// RGB color in [0, 1].
pub type PathColor = [f32; 3];

/// Colors handed out to new paths, indexed by `map_index % len`.
pub const DEFAULT_PALETTE: [PathColor; 6] = [
    [1.0, 0.0, 0.0],
    [0.0, 0.6, 1.0],
    [0.0, 0.8, 0.2],
    [1.0, 0.6, 0.0],
    [0.7, 0.2, 0.9],
    [0.9, 0.9, 0.1],
];

/// What happens to the previously active path when the active map changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveMapPolicy {
    /// Discard the history. Returning to the map starts from an empty path.
    #[default]
    Clear,
    /// Hide the path but keep its points for when the map becomes active again.
    HideRetain,
    /// Leave the path visible and untouched.
    KeepVisible,
}

impl InactiveMapPolicy {
    /// Policy selected by the boolean `hide_inactive_maps` switch:
    /// `true` clears inactive paths, `false` hides and retains them.
    pub fn from_hide_inactive_maps(hide_inactive_maps: bool) -> Self {
        if hide_inactive_maps {
            Self::Clear
        } else {
            Self::HideRetain
        }
    }
}

/// Configuration for the path registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRegistryConfig {
    /// Treatment of the previously active path on a map switch.
    #[serde(default)]
    pub inactive_maps: InactiveMapPolicy,

    /// Colors assigned to new paths.
    #[serde(default = "default_palette")]
    pub palette: Vec<PathColor>,
}

fn default_palette() -> Vec<PathColor> {
    DEFAULT_PALETTE.to_vec()
}

impl Default for PathRegistryConfig {
    fn default() -> Self {
        Self {
            inactive_maps: InactiveMapPolicy::default(),
            palette: default_palette(),
        }
    }
}

/// Lifecycle state of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// Accepting live appends.
    Live,
    /// Its map is no longer the active one.
    Inactive,
    /// Its map was merged into another; it never receives appends again.
    Merged,
}

/// Trajectory polyline of a single map.
#[derive(Debug, Clone)]
pub struct TrajectoryPath {
    map_index: MapIndex,
    points: Vec<Vector3<f64>>,
    color: PathColor,
    visible: bool,
    state: PathState,
}

impl TrajectoryPath {
    fn new(map_index: MapIndex, color: PathColor) -> Self {
        Self {
            map_index,
            points: Vec::new(),
            color,
            visible: true,
            state: PathState::Live,
        }
    }

    pub fn map_index(&self) -> MapIndex {
        self.map_index
    }

    /// Points in insertion order.
    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn color(&self) -> PathColor {
        self.color
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn state(&self) -> PathState {
        self.state
    }

    /// Visible and non-empty.
    pub fn is_drawable(&self) -> bool {
        self.visible && !self.points.is_empty()
    }
}

/// Registry of trajectory paths keyed by map index.
pub struct PathRegistry {
    paths: BTreeMap<MapIndex, TrajectoryPath>,
    active: Option<MapIndex>,
    config: PathRegistryConfig,
}

impl PathRegistry {
    /// Create an empty registry.
    pub fn new(config: PathRegistryConfig) -> Self {
        Self {
            paths: BTreeMap::new(),
            active: None,
            config,
        }
    }

    /// Deterministic default color for a map index.
    pub fn default_color(&self, map_index: MapIndex) -> PathColor {
        if self.config.palette.is_empty() {
            return DEFAULT_PALETTE[0];
        }
        self.config.palette[map_index % self.config.palette.len()]
    }

    /// Policy applied on map switches.
    pub fn inactive_map_policy(&self) -> InactiveMapPolicy {
        self.config.inactive_maps
    }

    /// Index of the active map, if any frame has been seen.
    pub fn active_index(&self) -> Option<MapIndex> {
        self.active
    }

    /// Number of map indices ever observed.
    pub fn num_paths(&self) -> usize {
        self.paths.len()
    }

    /// Look up a path without creating it.
    pub fn get(&self, map_index: MapIndex) -> Option<&TrajectoryPath> {
        self.paths.get(&map_index)
    }

    /// All paths ordered by map index.
    pub fn paths(&self) -> impl Iterator<Item = &TrajectoryPath> {
        self.paths.values()
    }

    /// Paths that should currently be drawn.
    pub fn drawable_paths(&self) -> impl Iterator<Item = &TrajectoryPath> {
        self.paths.values().filter(|p| p.is_drawable())
    }

    /// Return the path for `map_index`, creating an empty visible one if absent.
    ///
    /// Existing content is never reset.
    pub fn ensure_path(&mut self, map_index: MapIndex) -> &mut TrajectoryPath {
        let color = self.default_color(map_index);
        self.paths.entry(map_index).or_insert_with(|| {
            debug!("Creating path for map {}", map_index);
            TrajectoryPath::new(map_index, color)
        })
    }

    /// Append a point to the path of `map_index`.
    ///
    /// Unknown indices get a path created on the fly. Appends to inactive or
    /// merged paths are dropped; returns whether the point was stored.
    pub fn append_point(&mut self, map_index: MapIndex, point: Vector3<f64>) -> bool {
        let path = self.ensure_path(map_index);
        if path.state != PathState::Live {
            debug!(
                "Dropping append to map {} in state {:?}",
                map_index, path.state
            );
            return false;
        }
        path.points.push(point);
        true
    }

    /// Make `map_index` the active map.
    ///
    /// When the index differs from the previously active one, the inactive
    /// policy is applied to the previous path and the new path is shown.
    /// Returns the previously active index if a switch happened.
    pub fn set_active(&mut self, map_index: MapIndex) -> Option<MapIndex> {
        if self.is_merged(map_index) {
            warn!("Map {} was merged away, not reactivating it", map_index);
            return None;
        }
        if self.active == Some(map_index) {
            self.ensure_path(map_index);
            return None;
        }

        let previous = self.active.replace(map_index);
        let policy = self.config.inactive_maps;

        if let Some(prev) = previous {
            if let Some(path) = self.paths.get_mut(&prev) {
                if path.state == PathState::Live {
                    path.state = PathState::Inactive;
                }
                match policy {
                    InactiveMapPolicy::Clear => path.points.clear(),
                    InactiveMapPolicy::HideRetain => path.visible = false,
                    InactiveMapPolicy::KeepVisible => {}
                }
            }
        }

        let path = self.ensure_path(map_index);
        path.state = PathState::Live;
        path.visible = true;

        previous
    }

    /// Replace the full content of a path, e.g. after loop closure.
    ///
    /// Afterwards the path holds exactly `points`, in order.
    pub fn replace_trajectory<I>(&mut self, map_index: MapIndex, points: I) -> usize
    where
        I: IntoIterator<Item = Vector3<f64>>,
    {
        let path = self.ensure_path(map_index);
        path.points.clear();
        path.points.extend(points);
        path.points.len()
    }

    /// Make a path visible again without changing the active map.
    ///
    /// Merged paths stay hidden. Returns whether the path is now visible.
    pub fn show(&mut self, map_index: MapIndex) -> bool {
        match self.paths.get_mut(&map_index) {
            Some(path) if path.state != PathState::Merged => {
                path.visible = true;
                true
            }
            _ => false,
        }
    }

    fn is_merged(&self, map_index: MapIndex) -> bool {
        self.paths
            .get(&map_index)
            .is_some_and(|p| p.state == PathState::Merged)
    }

    /// Empty a path, keeping its registry entry.
    ///
    /// Returns `false` if the index was never observed (nothing to do).
    pub fn clear(&mut self, map_index: MapIndex) -> bool {
        match self.paths.get_mut(&map_index) {
            Some(path) => {
                path.points.clear();
                true
            }
            None => false,
        }
    }

    /// Clear and retire a map that was merged into another one.
    ///
    /// Returns `false` if the index was never observed.
    pub fn mark_merged(&mut self, map_index: MapIndex) -> bool {
        if self.active == Some(map_index) {
            self.active = None;
        }
        match self.paths.get_mut(&map_index) {
            Some(path) => {
                path.points.clear();
                path.visible = false;
                path.state = PathState::Merged;
                true
            }
            None => false,
        }
    }

    /// Total number of stored points across all paths.
    pub fn total_points(&self) -> usize {
        self.paths.values().map(|p| p.points.len()).sum()
    }
}

impl Default for PathRegistry {
    fn default() -> Self {
        Self::new(PathRegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64) -> Vector3<f64> {
        Vector3::new(x, 0.0, 0.0)
    }

    fn registry(policy: InactiveMapPolicy) -> PathRegistry {
        PathRegistry::new(PathRegistryConfig {
            inactive_maps: policy,
            ..Default::default()
        })
    }

    #[test]
    fn test_ensure_path_is_idempotent() {
        let mut reg = PathRegistry::default();
        reg.append_point(0, p(1.0));
        reg.append_point(0, p(2.0));

        let color = reg.ensure_path(0).color();
        let again = reg.ensure_path(0);
        assert_eq!(again.map_index(), 0);
        assert_eq!(again.color(), color);
        assert_eq!(again.len(), 2);
        assert_eq!(reg.num_paths(), 1);
    }

    #[test]
    fn test_new_path_is_empty_and_visible() {
        let mut reg = PathRegistry::default();
        let path = reg.ensure_path(4);

        assert!(path.is_empty());
        assert!(path.is_visible());
        assert_eq!(path.state(), PathState::Live);
        assert_eq!(path.color(), DEFAULT_PALETTE[4]);
    }

    #[test]
    fn test_default_color_wraps_palette() {
        let reg = PathRegistry::default();
        assert_eq!(reg.default_color(0), reg.default_color(DEFAULT_PALETTE.len()));
    }

    #[test]
    fn test_append_to_unknown_index_creates_path() {
        let mut reg = PathRegistry::default();
        assert!(reg.append_point(9, p(1.0)));
        assert_eq!(reg.get(9).map(|path| path.len()), Some(1));
    }

    #[test]
    fn test_append_preserves_call_order() {
        let mut reg = PathRegistry::default();
        for i in 0..10 {
            reg.append_point(2, p(i as f64));
        }

        let xs: Vec<f64> = reg.get(2).unwrap().points().iter().map(|v| v.x).collect();
        assert_eq!(xs, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_replace_trajectory_is_exact() {
        let mut reg = PathRegistry::default();
        for i in 0..50 {
            reg.append_point(0, p(i as f64));
        }

        let corrected = vec![p(-1.0), p(-2.0), p(-3.0)];
        assert_eq!(reg.replace_trajectory(0, corrected.clone()), 3);
        assert_eq!(reg.get(0).unwrap().points(), corrected.as_slice());

        reg.replace_trajectory(0, Vec::new());
        assert!(reg.get(0).unwrap().is_empty());
    }

    #[test]
    fn test_switch_with_clear_policy_loses_history() {
        let mut reg = registry(InactiveMapPolicy::Clear);
        reg.set_active(0);
        reg.append_point(0, p(1.0));
        reg.append_point(0, p(2.0));

        assert_eq!(reg.set_active(1), Some(0));
        assert!(reg.get(0).unwrap().is_empty());
        assert_eq!(reg.get(0).unwrap().state(), PathState::Inactive);

        assert_eq!(reg.set_active(0), Some(1));
        assert!(reg.get(0).unwrap().is_empty());
        assert!(reg.get(1).unwrap().is_empty());
    }

    #[test]
    fn test_switch_with_hide_policy_retains_history() {
        let mut reg = registry(InactiveMapPolicy::HideRetain);
        reg.set_active(0);
        reg.append_point(0, p(1.0));
        reg.set_active(1);

        let old = reg.get(0).unwrap();
        assert_eq!(old.len(), 1);
        assert!(!old.is_visible());
        assert_eq!(reg.drawable_paths().count(), 0);

        reg.set_active(0);
        assert!(reg.get(0).unwrap().is_drawable());
        assert!(reg.append_point(0, p(2.0)));
        assert_eq!(reg.get(0).unwrap().len(), 2);
    }

    #[test]
    fn test_keep_visible_policy_leaves_old_path_drawn() {
        let mut reg = registry(InactiveMapPolicy::KeepVisible);
        reg.set_active(0);
        reg.append_point(0, p(1.0));
        reg.set_active(1);

        assert!(reg.get(0).unwrap().is_drawable());
        assert!(!reg.append_point(0, p(2.0)));
    }

    #[test]
    fn test_same_active_index_is_not_a_switch() {
        let mut reg = registry(InactiveMapPolicy::Clear);
        reg.set_active(3);
        reg.append_point(3, p(1.0));

        assert_eq!(reg.set_active(3), None);
        assert_eq!(reg.get(3).unwrap().len(), 1);
    }

    #[test]
    fn test_clear_unknown_index_is_noop() {
        let mut reg = PathRegistry::default();
        assert!(!reg.clear(42));
        assert!(!reg.mark_merged(42));
        assert_eq!(reg.num_paths(), 0);
    }

    #[test]
    fn test_merged_path_rejects_appends() {
        let mut reg = PathRegistry::default();
        reg.set_active(0);
        reg.append_point(0, p(1.0));

        assert!(reg.mark_merged(0));
        assert_eq!(reg.active_index(), None);
        assert!(!reg.append_point(0, p(2.0)));

        let path = reg.get(0).unwrap();
        assert!(path.is_empty());
        assert!(!path.is_visible());
        assert_eq!(path.state(), PathState::Merged);
    }

    #[test]
    fn test_merged_path_is_never_reactivated() {
        let mut reg = registry(InactiveMapPolicy::Clear);
        reg.set_active(0);
        reg.append_point(0, p(1.0));
        reg.mark_merged(0);
        reg.set_active(1);

        assert_eq!(reg.set_active(0), None);
        assert_eq!(reg.active_index(), Some(1));
        assert!(!reg.append_point(0, p(2.0)));
        assert!(!reg.show(0));

        let path = reg.get(0).unwrap();
        assert!(path.is_empty());
        assert_eq!(path.state(), PathState::Merged);
    }

    #[test]
    fn test_show_reveals_hidden_path() {
        let mut reg = registry(InactiveMapPolicy::HideRetain);
        reg.set_active(0);
        reg.append_point(0, p(1.0));
        reg.set_active(1);
        assert!(!reg.get(0).unwrap().is_visible());

        assert!(reg.show(0));
        assert!(reg.get(0).unwrap().is_drawable());
        assert_eq!(reg.get(0).unwrap().state(), PathState::Inactive);
        assert!(!reg.show(7));
    }

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(InactiveMapPolicy::from_hide_inactive_maps(true), InactiveMapPolicy::Clear);
        assert_eq!(
            InactiveMapPolicy::from_hide_inactive_maps(false),
            InactiveMapPolicy::HideRetain
        );
    }
}
