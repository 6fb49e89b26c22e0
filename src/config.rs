use crate::{PlayerError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Playback settings, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Play the audio track alongside the video
    pub audio: bool,
    /// Draw the elapsed time / FPS line under the picture
    pub status_line: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio: true,
            status_line: true,
        }
    }
}

impl PlayerConfig {
    /// Load a configuration file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PlayerConfig = serde_json::from_str(&text).map_err(|e| {
            PlayerError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }
}
