//! MPlayer slave-mode module - embeds an external MPlayer and drives it over
//! its stdio pipes.
//!
//! Architecture:
//! - `process.rs` - MPlayer binary detection, process spawning and identify runs
//! - `slave.rs` - Background reader/writer tasks over the player's stdin/stdout
//! - `protocol.rs` - Command formatting and output line classification
//! - `properties.rs` / `state.rs` - Playback state and host events
//! - `window.rs` - Window attachment and fullscreen geometry
//! - `bindings.rs` - `input.conf` keybindings
//! - `client.rs` - High-level embedded player with command methods

mod bindings;
mod client;
mod process;
mod properties;
mod protocol;
mod slave;
mod state;
mod window;

pub use bindings::{BindingAction, Bindings};
pub use client::{format_time, KeyOutcome, MPlayerEmbed, PlayerError, OSD_DURATION_MS};
pub use process::{find_mplayer, identify, ProcessError};
pub use properties::Properties;
pub use protocol::{parse_property, Arg, Pausing, PropertyValue, ProtocolError, SlaveCommand, SlaveLine};
pub use slave::SlaveError;
pub use state::{PlaybackState, PlayerEvent, DEFAULT_RATIO};
pub use window::{FullscreenLayout, Size, WindowTarget};
