//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AssetError, Result};

/// Settings for an [`AssetServices`](crate::AssetServices) context
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Whether the invalid asset registry records anything
    pub track_invalid_assets: bool,
    /// Main-thread stall longer than this logs a warning
    pub stall_warning_threshold_ms: u64,
    /// Minimum gap between repeated stall warnings
    pub stall_warning_interval_ms: u64,
    /// Keep human readable names next to cached hashes
    pub record_asset_names: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            track_invalid_assets: cfg!(debug_assertions),
            stall_warning_threshold_ms: 100,
            stall_warning_interval_ms: 100,
            record_asset_names: cfg!(debug_assertions),
        }
    }
}

impl AssetConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AssetError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn stall_warning_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_warning_threshold_ms)
    }

    pub fn stall_warning_interval(&self) -> Duration {
        Duration::from_millis(self.stall_warning_interval_ms)
    }
}
