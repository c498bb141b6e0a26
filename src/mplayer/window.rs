//! Host window the player renders into, and fullscreen geometry.

use serde::{Deserialize, Serialize};

/// Smallest fullscreen output size accepted from the host.
const MIN_FULLSCREEN_EDGE: u32 = 5;
const MIN_LAYOUT_WIDTH: u32 = 320;
const MIN_LAYOUT_HEIGHT: u32 = 240;

/// Native window the player is embedded into (X11 window id / HWND).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTarget {
  pub wid: u64,
  pub width: u32,
  pub height: u32,
}

impl WindowTarget {
  pub fn new(wid: u64, width: u32, height: u32) -> Self {
    Self { wid, width, height }
  }

  /// Command-line arguments attaching the player to this window.
  pub fn args(&self) -> Vec<String> {
    vec![
      "-wid".to_string(),
      self.wid.to_string(),
      "-geometry".to_string(),
      format!("{}x{}", self.width, self.height),
    ]
  }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

impl Size {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  /// Clamp each edge to `[5, screen]`.
  pub fn clamp_to(self, screen: Size) -> Size {
    Size {
      width: self.width.clamp(MIN_FULLSCREEN_EDGE, screen.width.max(MIN_FULLSCREEN_EDGE)),
      height: self
        .height
        .clamp(MIN_FULLSCREEN_EDGE, screen.height.max(MIN_FULLSCREEN_EDGE)),
    }
  }
}

impl From<(u32, u32)> for Size {
  fn from((width, height): (u32, u32)) -> Self {
    Self::new(width, height)
  }
}

/// Where the host should place the video when going fullscreen: the content
/// sits in the upper left corner and the rest of the screen is padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullscreenLayout {
  pub width: u32,
  pub height: u32,
  pub right_padding: u32,
  pub bottom_padding: u32,
}

impl FullscreenLayout {
  pub fn compute(screen: Size, output: Size) -> Self {
    let width = screen.width.min(output.width).max(MIN_LAYOUT_WIDTH);
    let height = screen.height.min(output.height).max(MIN_LAYOUT_HEIGHT);
    Self {
      width,
      height,
      right_padding: screen.width.saturating_sub(width),
      bottom_padding: screen.height.saturating_sub(height),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_window_args() {
    let target = WindowTarget::new(0x2a00007, 400, 300);
    assert_eq!(
      target.args(),
      vec!["-wid", "44040199", "-geometry", "400x300"]
    );
  }

  #[test]
  fn test_fullscreen_size_is_clamped() {
    let screen = Size::new(1280, 1024);
    assert_eq!(Size::new(1, 4000).clamp_to(screen), Size::new(5, 1024));
    assert_eq!(Size::new(1024, 768).clamp_to(screen), Size::new(1024, 768));
  }

  #[test]
  fn test_layout_pads_to_screen_edges() {
    let layout = FullscreenLayout::compute(Size::new(1280, 1024), Size::new(1024, 768));
    assert_eq!(
      layout,
      FullscreenLayout {
        width: 1024,
        height: 768,
        right_padding: 256,
        bottom_padding: 256,
      }
    );
  }

  #[test]
  fn test_layout_has_a_minimum_size() {
    let layout = FullscreenLayout::compute(Size::new(1280, 1024), Size::new(5, 5));
    assert_eq!((layout.width, layout.height), (320, 240));
    assert_eq!((layout.right_padding, layout.bottom_padding), (960, 784));
  }
}
