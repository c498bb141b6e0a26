//! Flat property map describing the current file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::protocol::PropertyValue;

/// Properties collected from MPlayer's identify output, keyed by lower-case
/// name (`length`, `width`, `video_codec`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fresh map for a newly opened file.
  pub fn for_path(path: &str) -> Self {
    let mut props = Self::new();
    props.insert("path", PropertyValue::Text(path.to_string()));
    props
  }

  pub fn insert(&mut self, key: &str, value: PropertyValue) {
    self.0.insert(key.to_string(), value);
  }

  pub fn get(&self, key: &str) -> Option<&PropertyValue> {
    self.0.get(key)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.0.contains_key(key)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn clear(&mut self) {
    self.0.clear();
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
    self.0.iter()
  }

  fn number(&self, key: &str) -> Option<f64> {
    self.get(key).and_then(PropertyValue::as_f64)
  }

  /// Path of the file as passed to the player.
  pub fn path(&self) -> Option<&str> {
    self.get("path").and_then(PropertyValue::as_str)
  }

  pub fn filename(&self) -> Option<&str> {
    self.get("filename").and_then(PropertyValue::as_str)
  }

  /// Length in seconds.
  pub fn length(&self) -> Option<f64> {
    self.number("length")
  }

  pub fn width(&self) -> Option<f64> {
    self.number("width")
  }

  pub fn height(&self) -> Option<f64> {
    self.number("height")
  }

  /// Aspect ratio requested by the container, if any.
  pub fn video_aspect(&self) -> Option<f64> {
    self.number("video_aspect")
  }

  /// Aspect ratio currently applied to the output.
  pub fn ratio(&self) -> Option<f64> {
    self.number("ratio")
  }

  /// Ratio derived from the frame size when the file doesn't request one.
  pub fn fallback_ratio(&self) -> Option<f64> {
    match (self.width(), self.height()) {
      (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some(w / h),
      _ => None,
    }
  }
}

impl FromIterator<(String, PropertyValue)> for Properties {
  fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_typed_accessors() {
    let mut props = Properties::for_path("/movies/clip.avi");
    props.insert("length", PropertyValue::Float(93.5));
    props.insert("width", PropertyValue::Int(720));
    props.insert("height", PropertyValue::Int(576));

    assert_eq!(props.path(), Some("/movies/clip.avi"));
    assert_eq!(props.length(), Some(93.5));
    assert_eq!(props.fallback_ratio(), Some(720.0 / 576.0));
    assert_eq!(props.video_aspect(), None);
  }

  #[test]
  fn test_fallback_ratio_needs_both_dimensions() {
    let mut props = Properties::new();
    props.insert("height", PropertyValue::Int(576));
    assert_eq!(props.fallback_ratio(), None);
  }

  #[test]
  fn test_serializes_as_flat_map() {
    let mut props = Properties::new();
    props.insert("length", PropertyValue::Int(5));
    props.insert("video_codec", PropertyValue::Text("FFmpeg MPEG-4".into()));
    let json = serde_json::to_string(&props).unwrap();
    assert_eq!(json, r#"{"length":5,"video_codec":"FFmpeg MPEG-4"}"#);
  }
}
