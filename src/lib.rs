//! Embed MPlayer into a host application window and drive it through its
//! slave-mode protocol.
//!
//! The host hands [`MPlayerEmbed`] a native window id, calls its command
//! methods, and polls [`MPlayerEmbed::drain_events`] from its UI loop to learn
//! about file changes, lengths and aspect ratios.

mod config;
pub mod mplayer;

pub use config::{ConfigError, PlayerConfig};
pub use mplayer::{
  format_time, BindingAction, Bindings, FullscreenLayout, KeyOutcome, MPlayerEmbed, Pausing,
  PlayerError, PlayerEvent, Properties, PropertyValue, SlaveCommand, Size, WindowTarget,
};
