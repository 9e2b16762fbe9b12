use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::texture_atlas::DEFAULT_MAX_PAGE_SIZE;

/// Tuning knobs for the vertex array renderer.
///
/// Every field has a default, so a config file only needs to name what it
/// changes:
///
/// ```json
/// { "cull": true, "alpha_threshold": 0.1 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Drop primitives whose bounds miss the active viewport.
    pub cull: bool,
    /// Fragments with alpha at or below this value are discarded. 0 disables.
    pub alpha_threshold: f32,
    /// Largest atlas page dimension.
    pub max_texture_size: u32,
    /// Clear color used by frame loops that own the render pass.
    pub clear_color: [f64; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            cull: false,
            alpha_threshold: 0.0,
            max_texture_size: DEFAULT_MAX_PAGE_SIZE,
            clear_color: [0.1, 0.2, 0.3, 1.0],
        }
    }
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn wgpu_clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}
