//! Playback state shared between the output reader and the host.

use serde::Serialize;

use super::properties::Properties;
use super::protocol::{PropertyValue, SlaveLine};

/// Ratio used until the player reports one.
pub const DEFAULT_RATIO: f64 = 16.0 / 9.0;

/// Notifications for the host. They are queued by the background reader and
/// meant to be handled on the host's UI thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PlayerEvent {
  /// The player process exited.
  Stopped,
  /// A new file was opened; carries its path.
  FileChanged(String),
  /// The file is loaded; carries everything collected about it.
  PropertiesChanged(Properties),
  /// A new playlist was handed to the player.
  PlaylistChanged(Vec<String>),
  /// Length of the current file in seconds.
  LengthChanged(f64),
  /// Aspect ratio the video area should use.
  AspectChanged(f64),
  FullscreenToggled(bool),
}

#[derive(Debug, Clone)]
pub struct PlaybackState {
  pub current: Properties,
  pub playlist: Vec<String>,
  pub ratio: f64,
  pub fullscreen: bool,
}

impl Default for PlaybackState {
  fn default() -> Self {
    Self {
      current: Properties::new(),
      playlist: Vec::new(),
      ratio: DEFAULT_RATIO,
      fullscreen: false,
    }
  }
}

impl PlaybackState {
  pub fn set_ratio(&mut self, ratio: f64) {
    self.ratio = ratio;
    self.current.insert("ratio", PropertyValue::Float(ratio));
  }

  /// Fold one classified output line into the state, returning the events
  /// the host should see. Answers are not handled here.
  pub fn apply(&mut self, line: SlaveLine) -> Vec<PlayerEvent> {
    match line {
      SlaveLine::PlaybackStarted => vec![PlayerEvent::PropertiesChanged(self.current.clone())],
      SlaveLine::Property { key, value } => self.apply_property(&key, value),
      SlaveLine::Answer { .. } | SlaveLine::Other => Vec::new(),
    }
  }

  fn apply_property(&mut self, key: &str, value: PropertyValue) -> Vec<PlayerEvent> {
    match key {
      "filename" => {
        let path = value.to_string();
        self.current = Properties::for_path(&path);
        self.current.insert("filename", value);
        vec![PlayerEvent::FileChanged(path)]
      }
      "length" => {
        let length = value.as_f64();
        self.current.insert(key, value);
        length.map(PlayerEvent::LengthChanged).into_iter().collect()
      }
      "height" => {
        self.current.insert(key, value);
        if self.current.video_aspect().is_some() {
          return Vec::new();
        }
        match self.current.fallback_ratio() {
          Some(ratio) => {
            self.set_ratio(ratio);
            vec![PlayerEvent::AspectChanged(ratio)]
          }
          None => Vec::new(),
        }
      }
      "video_aspect" => {
        let ratio = value.as_f64();
        self.current.insert(key, value);
        match ratio {
          Some(ratio) => {
            self.set_ratio(ratio);
            vec![PlayerEvent::AspectChanged(ratio)]
          }
          None => Vec::new(),
        }
      }
      _ => {
        self.current.insert(key, value);
        Vec::new()
      }
    }
  }

  /// Reset after the player exited.
  pub fn on_stopped(&mut self) -> Vec<PlayerEvent> {
    self.current.clear();
    let mut events = vec![PlayerEvent::Stopped];
    if self.fullscreen {
      self.fullscreen = false;
      events.push(PlayerEvent::FullscreenToggled(false));
    }
    events
  }
}
