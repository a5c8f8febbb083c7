//! Editor timing and identity settings.
//!
//! ```toml
//! display_name = "Ada"
//! autosave_debounce_ms = 500
//! status_badge_ms = 2500
//! presence_liveness_ms = 30000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("error parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Name shown next to this session's caret on other screens.
    pub display_name: SmolStr,
    /// Fixed caret colour (RGBA). Peers pick one from their palette if unset.
    pub color: Option<u32>,
    /// Quiet period after the last edit before a snapshot is written.
    pub autosave_debounce_ms: u64,
    /// How long the status badge stays up after the last transition.
    pub status_badge_ms: u64,
    /// Remote sessions not heard from for this long are dropped.
    pub presence_liveness_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            display_name: "Anonymous".into(),
            color: None,
            autosave_debounce_ms: 500,
            status_badge_ms: 2_500,
            presence_liveness_ms: 30_000,
        }
    }
}

impl EditorConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn status_badge(&self) -> Duration {
        Duration::from_millis(self.status_badge_ms)
    }

    pub fn presence_liveness(&self) -> Duration {
        Duration::from_millis(self.presence_liveness_ms)
    }
}
