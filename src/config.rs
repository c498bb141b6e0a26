//! Player configuration with persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mplayer::Size;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("Invalid config file: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("{0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Custom MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub mplayer_path: Option<String>,

  /// Additional MPlayer command-line arguments.
  #[serde(default)]
  pub mplayer_args: Vec<String>,

  /// How long to wait for an `ANS_` line, in milliseconds.
  #[serde(default = "default_answer_timeout_ms")]
  pub answer_timeout_ms: u64,

  /// How long `quit` gets before the process is killed, in milliseconds.
  #[serde(default = "default_quit_grace_ms")]
  pub quit_grace_ms: u64,

  /// Size of the screen fullscreen mode is computed against.
  #[serde(default = "default_screen_size")]
  pub screen_size: Size,

  /// Output size in fullscreen mode (None = whole screen).
  #[serde(default)]
  pub fullscreen_size: Option<Size>,

  /// Files searched for MPlayer keybindings, first readable wins.
  #[serde(default = "default_input_conf_paths")]
  pub input_conf_paths: Vec<PathBuf>,
}

fn default_answer_timeout_ms() -> u64 {
  1000
}

fn default_quit_grace_ms() -> u64 {
  500
}

fn default_screen_size() -> Size {
  Size::new(1920, 1080)
}

fn default_input_conf_paths() -> Vec<PathBuf> {
  let mut paths = Vec::new();
  if let Some(home) = dirs::home_dir() {
    paths.push(home.join(".mplayer").join("input.conf"));
  }
  paths.push(PathBuf::from("/etc/mplayer/input.conf"));
  paths
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      mplayer_path: None,
      mplayer_args: Vec::new(),
      answer_timeout_ms: default_answer_timeout_ms(),
      quit_grace_ms: default_quit_grace_ms(),
      screen_size: default_screen_size(),
      fullscreen_size: None,
      input_conf_paths: default_input_conf_paths(),
    }
  }
}

impl PlayerConfig {
  /// Default location: `<config dir>/mplayer-embed/config.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mplayer-embed").join("config.json"))
  }

  /// Load from a JSON file; a missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = match std::fs::read_to_string(path) {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::info!("No config at {:?}, using defaults", path);
        return Ok(Self::default());
      }
      Err(e) => return Err(e.into()),
    };
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if let Some(path) = &self.mplayer_path {
      if path.trim().is_empty() {
        return Err(ConfigError::Invalid("MPlayer path cannot be empty".to_string()));
      }
    }
    if self.answer_timeout_ms == 0 || self.answer_timeout_ms > 60_000 {
      return Err(ConfigError::Invalid(
        "Answer timeout must be between 1 and 60000 ms".to_string(),
      ));
    }
    if self.screen_size.width == 0 || self.screen_size.height == 0 {
      return Err(ConfigError::Invalid("Screen size cannot be zero".to_string()));
    }
    Ok(())
  }

  pub fn mplayer_path(&self) -> Option<PathBuf> {
    self
      .mplayer_path
      .as_ref()
      .filter(|s| !s.is_empty())
      .map(PathBuf::from)
  }

  pub fn answer_timeout(&self) -> Duration {
    Duration::from_millis(self.answer_timeout_ms)
  }

  pub fn quit_grace(&self) -> Duration {
    Duration::from_millis(self.quit_grace_ms)
  }

  /// Fullscreen output size, clamped to the screen.
  pub fn fullscreen_size(&self) -> Size {
    self
      .fullscreen_size
      .unwrap_or(self.screen_size)
      .clamp_to(self.screen_size)
  }
}
