use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::display::ChannelLayout;
use crate::error::RasterError;

/// Preferred scaling strategy when the caller does not choose one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StretchQuality {
    /// Per-pixel sampling at fractional source coordinates
    #[default]
    Slow,
    /// Fixed per-step source increments
    Fast,
}

/// Rasterizer settings, persisted as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Channel layout of the display native pixel data is built for
    #[serde(default)]
    pub layout: ChannelLayout,
    #[serde(default)]
    pub stretch_quality: StretchQuality,
    /// Check the guard slot past dense storage whenever a buffer is dropped
    #[serde(default = "default_verify")]
    pub verify_sentinel_on_drop: bool,
}

fn default_verify() -> bool {
    true
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            layout: ChannelLayout::default(),
            stretch_quality: StretchQuality::default(),
            verify_sentinel_on_drop: default_verify(),
        }
    }
}

impl RasterConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, RasterError> {
        let config: Self = serde_json::from_str(json)?;
        config.layout.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, RasterError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save config to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RasterError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
