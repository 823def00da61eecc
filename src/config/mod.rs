//! Viewer configuration loaded from YAML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration:
//!
//! ```yaml
//! scene:
//!   hide_inactive_maps: true
//!   anchors:
//!     cube_size: 0.1
//!     marker_size: 0.05
//! dispatch:
//!   mode: worker
//!   worker:
//!     queue_capacity: 64
//! visualization:
//!   app_id: slam-ar-replay
//! ```

mod error;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atlas::path_registry::DEFAULT_PALETTE;
use crate::atlas::{AnchorStyle, InactiveMapPolicy, PathColor, PathRegistryConfig};
use crate::system::EventWorkerConfig;

pub use error::ConfigError;

/// Scene store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSection {
    /// Clear the previously active path on a map switch (`true`) or hide and
    /// retain it (`false`).
    #[serde(default = "default_true")]
    pub hide_inactive_maps: bool,

    /// Explicit policy, overriding `hide_inactive_maps` when set.
    #[serde(default)]
    pub inactive_maps: Option<InactiveMapPolicy>,

    /// Path colors, assigned by map index.
    #[serde(default = "default_palette")]
    pub palette: Vec<PathColor>,

    /// Anchor sizes.
    #[serde(default)]
    pub anchors: AnchorStyle,
}

fn default_true() -> bool {
    true
}

fn default_palette() -> Vec<PathColor> {
    DEFAULT_PALETTE.to_vec()
}

impl Default for SceneSection {
    fn default() -> Self {
        Self {
            hide_inactive_maps: true,
            inactive_maps: None,
            palette: default_palette(),
            anchors: AnchorStyle::default(),
        }
    }
}

impl SceneSection {
    /// Effective inactive-map policy.
    pub fn inactive_map_policy(&self) -> InactiveMapPolicy {
        self.inactive_maps
            .unwrap_or_else(|| InactiveMapPolicy::from_hide_inactive_maps(self.hide_inactive_maps))
    }

    pub fn path_registry_config(&self) -> PathRegistryConfig {
        PathRegistryConfig {
            inactive_maps: self.inactive_map_policy(),
            palette: self.palette.clone(),
        }
    }
}

/// Where pipeline notifications are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// On the caller's thread, inside `push_event`.
    Inline,
    /// On a dedicated worker thread fed by a channel.
    #[default]
    Worker,
}

/// Notification dispatch settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default)]
    pub mode: DispatchMode,

    #[serde(default)]
    pub worker: EventWorkerConfig,
}

/// Rerun output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationSection {
    /// Recording application id.
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Write an `.rrd` file instead of spawning the viewer.
    #[serde(default)]
    pub save_path: Option<String>,
}

fn default_app_id() -> String {
    "slam-ar-replay".to_string()
}

impl Default for VisualizationSection {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            save_path: None,
        }
    }
}

/// Full viewer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub scene: SceneSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub visualization: VisualizationSection,
}

impl ViewerConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }
}
