//! High-level embedded player with command methods.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Child;

use super::bindings::{BindingAction, Bindings};
use super::process::{identify, slave_args, spawn_slave, ProcessError};
use super::properties::Properties;
use super::protocol::SlaveCommand;
use super::slave::{SlaveConnection, SlaveError};
use super::state::{PlaybackState, PlayerEvent};
use super::window::{FullscreenLayout, Size, WindowTarget};
use crate::config::PlayerConfig;

/// How long OSD messages stay visible, in milliseconds.
pub const OSD_DURATION_MS: u32 = 3000;

#[derive(Error, Debug)]
pub enum PlayerError {
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("Slave error: {0}")]
  Slave(#[from] SlaveError),
  #[error("Playlist error: {0}")]
  Playlist(#[from] std::io::Error),
  #[error("Playlist is empty")]
  EmptyPlaylist,
  #[error("Unexpected answer {key}={value}")]
  InvalidAnswer { key: String, value: String },
  #[error("MPlayer is not running")]
  NotRunning,
}

/// Result of a key press routed through [`MPlayerEmbed::handle_key`].
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
  /// No binding for the key; the host may handle it.
  Unbound,
  /// The key was consumed.
  Handled,
  /// The host should keep its toplevel window above others.
  KeepAbove,
  /// The host should move the player into a fullscreen window.
  EnterFullscreen(FullscreenLayout),
  /// The host should move the player back to its normal parent.
  LeaveFullscreen,
}

/// A running player process and its channel.
struct Session {
  child: Child,
  conn: Arc<SlaveConnection>,
  /// `quit` was sent; the process is on its way out.
  quitting: bool,
}

impl Session {
  fn is_alive(&mut self) -> bool {
    !self.quitting && self.conn.is_alive() && matches!(self.child.try_wait(), Ok(None))
  }
}

/// MPlayer embedded into a host window.
///
/// All methods may be called from the host's UI thread inside a tokio
/// runtime. State changes detected by the output reader are delivered as
/// [`PlayerEvent`]s; drain them with [`MPlayerEmbed::drain_events`] from the
/// UI loop and apply them there.
#[derive(Clone)]
pub struct MPlayerEmbed {
  config: Arc<Mutex<PlayerConfig>>,
  window: Arc<Mutex<Option<WindowTarget>>>,
  session: Arc<Mutex<Option<Session>>>,
  playback: Arc<Mutex<PlaybackState>>,
  bindings: Arc<Mutex<Bindings>>,
  playlist_file: Arc<Mutex<Option<NamedTempFile>>>,
  event_tx: Sender<PlayerEvent>,
  event_rx: Receiver<PlayerEvent>,
}

impl MPlayerEmbed {
  /// Create a player; keybindings are loaded from the configured
  /// `input.conf` locations.
  pub fn new(config: PlayerConfig) -> Self {
    let bindings = Bindings::load(&config.input_conf_paths);
    let (event_tx, event_rx) = async_channel::unbounded();
    Self {
      config: Arc::new(Mutex::new(config)),
      window: Arc::new(Mutex::new(None)),
      session: Arc::new(Mutex::new(None)),
      playback: Arc::new(Mutex::new(PlaybackState::default())),
      bindings: Arc::new(Mutex::new(bindings)),
      playlist_file: Arc::new(Mutex::new(None)),
      event_tx,
      event_rx,
    }
  }

  pub fn config(&self) -> PlayerConfig {
    self.config.lock().clone()
  }

  /// Update MPlayer path (takes effect on next start).
  pub fn set_mplayer_path(&self, path: Option<PathBuf>) {
    self.config.lock().mplayer_path = path.map(|p| p.to_string_lossy().into_owned());
  }

  /// Update extra MPlayer arguments (takes effect on next start).
  pub fn set_mplayer_args(&self, args: Vec<String>) {
    self.config.lock().mplayer_args = args;
  }

  /// Window the next player process renders into (takes effect on next start).
  pub fn set_window(&self, window: Option<WindowTarget>) {
    *self.window.lock() = window;
  }

  pub fn window(&self) -> Option<WindowTarget> {
    *self.window.lock()
  }

  // ==========================================================================
  // Process lifecycle
  // ==========================================================================

  /// Check if the player process is running and accepting commands.
  pub fn is_alive(&self) -> bool {
    self.session.lock().as_mut().map_or(false, Session::is_alive)
  }

  fn connection(&self) -> Option<Arc<SlaveConnection>> {
    let mut session = self.session.lock();
    let s = session.as_mut()?;
    if s.is_alive() {
      Some(s.conn.clone())
    } else {
      None
    }
  }

  /// Wait for a player that was told to quit, so a new one can start
  /// without the old reader resetting its state.
  async fn finish_quit(&self) {
    let quitting = self.session.lock().as_ref().map_or(false, |s| s.quitting);
    if quitting {
      log::debug!("Waiting for quitting MPlayer before restarting");
      self.kill().await;
    }
  }

  /// Start the player unless it is already running.
  fn open(&self, launch_args: &[String]) -> Result<Arc<SlaveConnection>, PlayerError> {
    let mut session = self.session.lock();
    if let Some(s) = session.as_mut() {
      if s.is_alive() {
        return Ok(s.conn.clone());
      }
      log::debug!("Discarding stopped MPlayer session");
    }
    *session = None;

    let config = self.config.lock().clone();
    let window = *self.window.lock();
    let args = slave_args(window.as_ref(), &config.mplayer_args, launch_args);
    let mut child = spawn_slave(config.mplayer_path().as_deref(), &args)?;

    let stdin = child.stdin.take().ok_or(ProcessError::MissingPipe)?;
    let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe)?;
    let conn = Arc::new(SlaveConnection::setup(
      stdout,
      stdin,
      self.playback.clone(),
      self.event_tx.clone(),
    ));

    log::info!("MPlayer started (pid: {:?})", child.id());
    *session = Some(Session {
      child,
      conn: conn.clone(),
      quitting: false,
    });
    Ok(conn)
  }

  /// Stop the player: ask it to quit, then kill it if it doesn't exit within
  /// the configured grace period. Does nothing if no player was started.
  pub async fn kill(&self) {
    let session = self.session.lock().take();
    let Some(Session {
      mut child,
      conn,
      quitting,
    }) = session
    else {
      log::debug!("No MPlayer process to kill");
      return;
    };
    let grace = self.config.lock().quit_grace();

    if !quitting && conn.is_alive() {
      let _ = conn.send(&SlaveCommand::quit()).await;
    }
    conn.close();

    match tokio::time::timeout(grace, child.wait()).await {
      Ok(Ok(status)) => log::info!("MPlayer exited with: {}", status),
      Ok(Err(e)) => log::error!("wait() failed: {}", e),
      Err(_) => {
        log::info!("MPlayer ignored quit, killing (pid: {:?})", child.id());
        if let Err(e) = child.kill().await {
          log::error!("kill() failed: {}", e);
        }
      }
    }

    if tokio::time::timeout(grace, conn.join()).await.is_err() {
      log::warn!("MPlayer background tasks did not finish");
    }
    *self.playlist_file.lock() = None;
    log::info!("MPlayer stopped");
  }

  // ==========================================================================
  // Commands
  // ==========================================================================

  /// Send a command to the running player.
  ///
  /// Accepts a [`SlaveCommand`] or a raw line:
  ///
  /// ```ignore
  /// player.send_command("seek 10").await?;
  /// player.send_command(SlaveCommand::loadfile(path)).await?;
  /// ```
  pub async fn send_command(&self, cmd: impl Into<SlaveCommand>) -> Result<(), PlayerError> {
    let conn = self.connection().ok_or(PlayerError::NotRunning)?;
    conn.send(&cmd.into()).await?;
    Ok(())
  }

  /// Send a command, starting the player first if necessary.
  pub async fn send_command_opening(
    &self,
    cmd: impl Into<SlaveCommand>,
  ) -> Result<(), PlayerError> {
    self.finish_quit().await;
    let conn = self.open(&[])?;
    conn.send(&cmd.into()).await?;
    Ok(())
  }

  /// Send a query and wait for the player's `ANS_<key>` answer. The pause
  /// state is kept unless the command picks another pausing mode.
  pub async fn read_command(
    &self,
    cmd: impl Into<SlaveCommand>,
    key: &str,
  ) -> Result<String, PlayerError> {
    let conn = self.connection().ok_or(PlayerError::NotRunning)?;
    let timeout = self.config.lock().answer_timeout();
    let cmd = cmd.into().pausing_keep_default();
    Ok(conn.query(&cmd, key, timeout).await?)
  }

  async fn read_number(&self, cmd: &str, key: &str) -> Result<f64, PlayerError> {
    let value = self.read_command(SlaveCommand::new(cmd), key).await?;
    value.parse().map_err(|_| PlayerError::InvalidAnswer {
      key: key.to_string(),
      value,
    })
  }

  /// Current position in seconds.
  pub async fn time_pos(&self) -> Result<f64, PlayerError> {
    self.read_number("get_time_pos", "TIME_POSITION").await
  }

  /// Current position as a percentage of the file.
  pub async fn percent_pos(&self) -> Result<f64, PlayerError> {
    self.read_number("get_percent_pos", "PERCENT_POSITION").await
  }

  /// Read an MPlayer property (see `mplayer -list-properties`).
  pub async fn get_property(&self, name: &str) -> Result<String, PlayerError> {
    self.read_command(SlaveCommand::get_property(name), name).await
  }

  /// Play one or more files. Replaces the playlist of a running player,
  /// or starts a new one.
  pub async fn play<I, S>(&self, files: I) -> Result<(), PlayerError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let playlist: Vec<String> = files.into_iter().map(Into::into).collect();
    if playlist.is_empty() {
      return Err(PlayerError::EmptyPlaylist);
    }
    self.finish_quit().await;

    self.playback.lock().playlist = playlist.clone();
    self.emit(PlayerEvent::PlaylistChanged(playlist.clone()));

    let mut file = tempfile::Builder::new()
      .prefix("mplayer-embed-")
      .suffix(".txt")
      .tempfile()?;
    for entry in &playlist {
      writeln!(file, "{}", entry)?;
    }
    file.flush()?;
    let list_path = file.path().to_string_lossy().into_owned();
    log::info!("Playing {} file(s) from {}", playlist.len(), list_path);

    let result = match self.connection() {
      Some(conn) => conn
        .send(&SlaveCommand::loadlist(&list_path))
        .await
        .map_err(PlayerError::from),
      None => self
        .open(&["-playlist".to_string(), list_path])
        .map(|_| ()),
    };
    *self.playlist_file.lock() = Some(file);
    result
  }

  /// Quit the player. It counts as stopped from here on; the next `play`
  /// waits for it to exit and starts a new one.
  pub async fn stop(&self) -> Result<(), PlayerError> {
    let conn = {
      let mut session = self.session.lock();
      let s = session.as_mut().ok_or(PlayerError::NotRunning)?;
      if !s.is_alive() {
        return Err(PlayerError::NotRunning);
      }
      s.quitting = true;
      s.conn.clone()
    };
    conn.send(&SlaveCommand::quit()).await?;
    Ok(())
  }

  /// Play the next file in the playlist.
  pub async fn next(&self, step: u32) -> Result<(), PlayerError> {
    self.send_command(SlaveCommand::pt_step(step as i64)).await
  }

  /// Play the previous file in the playlist.
  pub async fn previous(&self, step: u32) -> Result<(), PlayerError> {
    self.send_command(SlaveCommand::pt_step(-(step as i64))).await
  }

  /// Seek forward or backward by `step` seconds.
  pub async fn seek(&self, step: f64) -> Result<(), PlayerError> {
    self.send_command(SlaveCommand::seek(step)).await
  }

  /// Toggle pause.
  pub async fn pause(&self) -> Result<(), PlayerError> {
    self.send_command(SlaveCommand::pause()).await
  }

  /// Toggle audio output.
  pub async fn mute(&self) -> Result<(), PlayerError> {
    self.send_command(SlaveCommand::mute()).await
  }

  /// Show text in the OSD for `duration_ms`.
  pub async fn show_text(&self, text: &str, duration_ms: u32) -> Result<(), PlayerError> {
    self
      .send_command(SlaveCommand::osd_show_text(text, duration_ms))
      .await
  }

  /// Show file name, position, length and percentage in the OSD.
  pub async fn show_info(&self) -> Result<(), PlayerError> {
    let (path, length) = {
      let playback = self.playback.lock();
      match playback.current.path() {
        Some(path) => (path.to_string(), playback.current.length().unwrap_or(0.0)),
        None => return Ok(()),
      }
    };
    let pos = self.time_pos().await?;
    let percent = self.percent_pos().await?;
    let text = info_text(&path, pos, length, percent);
    self.show_text(&text, OSD_DURATION_MS).await
  }

  /// Show the local time in the OSD.
  pub async fn show_clock(&self) -> Result<(), PlayerError> {
    let now = chrono::Local::now().format("%H:%M:%S").to_string();
    self.show_text(&now, OSD_DURATION_MS).await
  }

  /// Identify a file without playing it.
  pub async fn identify(&self, file: &Path) -> Result<Properties, PlayerError> {
    let path = self.config.lock().mplayer_path();
    Ok(identify(path.as_deref(), file).await?)
  }

  // ==========================================================================
  // State
  // ==========================================================================

  /// Properties of the current file.
  pub fn current(&self) -> Properties {
    self.playback.lock().current.clone()
  }

  pub fn playlist(&self) -> Vec<String> {
    self.playback.lock().playlist.clone()
  }

  /// Aspect ratio of the video area.
  pub fn ratio(&self) -> f64 {
    self.playback.lock().ratio
  }

  pub fn set_ratio(&self, ratio: f64) {
    log::debug!("Changing aspect ratio to {}", ratio);
    self.playback.lock().set_ratio(ratio);
  }

  // ==========================================================================
  // Fullscreen
  // ==========================================================================

  pub fn is_fullscreen(&self) -> bool {
    self.playback.lock().fullscreen
  }

  /// Output size in fullscreen mode.
  pub fn fullscreen_size(&self) -> Size {
    self.config.lock().fullscreen_size()
  }

  /// Set the output size for fullscreen mode, clamped to the screen. The
  /// video is placed in the upper left corner of the screen.
  pub fn set_fullscreen_size(&self, size: Size) {
    let mut config = self.config.lock();
    config.fullscreen_size = Some(size.clamp_to(config.screen_size));
  }

  /// Screen size reported by the host.
  pub fn set_screen_size(&self, size: Size) {
    self.config.lock().screen_size = size;
  }

  /// Toggle fullscreen mode. Returns the layout to apply when entering it.
  pub fn toggle_fullscreen(&self) -> Option<FullscreenLayout> {
    let fullscreen = {
      let mut playback = self.playback.lock();
      playback.fullscreen = !playback.fullscreen;
      playback.fullscreen
    };
    self.emit(PlayerEvent::FullscreenToggled(fullscreen));

    if fullscreen {
      let config = self.config.lock();
      Some(FullscreenLayout::compute(
        config.screen_size,
        config.fullscreen_size(),
      ))
    } else {
      None
    }
  }

  /// Enter or leave fullscreen mode if needed.
  pub fn set_fullscreen(&self, fullscreen: bool) -> Option<FullscreenLayout> {
    if self.is_fullscreen() == fullscreen {
      return None;
    }
    self.toggle_fullscreen()
  }

  // ==========================================================================
  // Keybindings
  // ==========================================================================

  /// Bind a key to a slave command.
  pub fn add_binding(&self, key: &str, command: &str) -> bool {
    self.bindings.lock().bind_command(key, command)
  }

  /// Bind a key to a custom callback.
  pub fn add_binding_fn<F>(&self, key: &str, f: F) -> bool
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.bindings.lock().bind_fn(key, f)
  }

  /// Run the action bound to `key` (a character or keysym name).
  pub async fn handle_key(&self, key: &str) -> Result<KeyOutcome, PlayerError> {
    let action = self.bindings.lock().get(key).cloned();
    let Some(action) = action else {
      return Ok(KeyOutcome::Unbound);
    };

    let result = match action {
      BindingAction::Command(command) => self.send_command(command.as_str()).await,
      BindingAction::ToggleFullscreen => {
        return Ok(match self.toggle_fullscreen() {
          Some(layout) => KeyOutcome::EnterFullscreen(layout),
          None => KeyOutcome::LeaveFullscreen,
        });
      }
      BindingAction::KeepAbove => return Ok(KeyOutcome::KeepAbove),
      BindingAction::ShowInfo => self.show_info().await,
      BindingAction::ShowClock => self.show_clock().await,
      BindingAction::Custom(f) => {
        f();
        Ok(())
      }
    };

    match result {
      Ok(()) => Ok(KeyOutcome::Handled),
      Err(PlayerError::NotRunning) => {
        log::debug!("Ignoring key {:?}, MPlayer is not running", key);
        Ok(KeyOutcome::Handled)
      }
      Err(e) => Err(e),
    }
  }

  // ==========================================================================
  // Events
  // ==========================================================================

  fn emit(&self, event: PlayerEvent) {
    let _ = self.event_tx.try_send(event);
  }

  /// Get the event receiver.
  pub fn events(&self) -> Receiver<PlayerEvent> {
    self.event_rx.clone()
  }

  /// Take all queued events without waiting, for polling from a UI loop.
  pub fn drain_events(&self) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.event_rx.try_recv() {
      events.push(event);
    }
    events
  }
}

/// Format seconds as `HH:MM:SS`.
pub fn format_time(seconds: f64) -> String {
  let total = seconds.max(0.0) as u64;
  format!(
    "{:02}:{:02}:{:02}",
    total / 3600,
    (total % 3600) / 60,
    total % 60
  )
}

fn info_text(path: &str, pos: f64, length: f64, percent: f64) -> String {
  let name = Path::new(path)
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.to_string());
  format!(
    "{}   {} / {}   ({}%)",
    name,
    format_time(pos),
    format_time(length),
    percent as i64
  )
}
