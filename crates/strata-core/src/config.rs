//! Engine configuration.
//!
//! [`EngineConfig`] collects the tunables of the flattening adapter, the drag
//! engine and the selection store. It can be built in code or loaded from a
//! TOML file where every key is optional:
//!
//! ```toml
//! max_initial_children = 50
//! lazy_load_threshold = 100
//! horizontal_threshold = 30.0
//! drag_activation_distance = 8.0
//! preferences_namespace = "layerTree"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PrefsError, PrefsResult};

/// Tunables for the layer tree engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Children shown for a large group before a "load more" row.
    pub max_initial_children: usize,
    /// Groups with more children than this are truncated until loaded.
    pub lazy_load_threshold: usize,
    /// Horizontal pointer travel, in pixels, that turns a drag into pack/unpack.
    pub horizontal_threshold: f64,
    /// Pointer travel, in pixels, before a press becomes a drag.
    pub drag_activation_distance: f64,
    /// Key prefix for persisted expansion/selection state.
    pub preferences_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_initial_children: 50,
            lazy_load_threshold: 100,
            horizontal_threshold: 30.0,
            drag_activation_distance: 8.0,
            preferences_namespace: "layerTree".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> PrefsResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> PrefsResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PrefsError::io(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> PrefsResult<String> {
        Ok(toml::to_string(self)?)
    }
}
