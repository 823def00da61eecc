//! Queries the viewer makes against the SLAM backend.

use crate::atlas::MapIndex;
use crate::geometry::SE3;

/// Read access to the backend's map state.
///
/// Called from inside the scene lock while an event is applied, so
/// implementations must not call back into the viewer.
pub trait SlamBackend: Send + Sync {
    /// Map currently being tracked.
    fn active_map_index(&self) -> MapIndex;

    /// Full trajectory (T_wc per frame, oldest first) of a map, reflecting
    /// every correction applied so far. Unknown maps yield an empty list.
    fn trajectory(&self, map_index: MapIndex) -> Vec<SE3>;

    /// Whether the estimator is currently resetting.
    fn is_reset(&self) -> bool {
        false
    }
}
