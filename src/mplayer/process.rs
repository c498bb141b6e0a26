//! MPlayer executable detection and process spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::properties::Properties;
use super::protocol::parse_property;
use super::window::WindowTarget;

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPlayer executable not found")]
  NotFound,
  #[error("Failed to spawn MPlayer: {0}")]
  SpawnFailed(std::io::Error),
  #[error("MPlayer I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("MPlayer produced no output handle")]
  MissingPipe,
}

/// Find the MPlayer executable in common locations.
pub fn find_mplayer() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mplayer") {
    return Some(path);
  }

  #[cfg(windows)]
  {
    let common_paths = [
      r"C:\Program Files\MPlayer\mplayer.exe",
      r"C:\Program Files (x86)\MPlayer\mplayer.exe",
      r"C:\mplayer\mplayer.exe",
    ];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(target_os = "macos")]
  {
    let common_paths = ["/usr/local/bin/mplayer", "/opt/homebrew/bin/mplayer"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  #[cfg(all(unix, not(target_os = "macos")))]
  {
    let common_paths = ["/usr/bin/mplayer", "/usr/local/bin/mplayer"];
    for path in common_paths {
      let p = PathBuf::from(path);
      if p.exists() {
        return Some(p);
      }
    }
  }

  None
}

fn resolve(mplayer_path: Option<&Path>) -> Result<PathBuf, ProcessError> {
  mplayer_path
    .map(Path::to_path_buf)
    .or_else(find_mplayer)
    .ok_or(ProcessError::NotFound)
}

/// Arguments for a slave-mode player: slave flags, window attachment, user
/// options, then launch options such as `-playlist <file>`.
pub fn slave_args(
  window: Option<&WindowTarget>,
  extra_args: &[String],
  launch_args: &[String],
) -> Vec<String> {
  let mut args: Vec<String> = ["-slave", "-quiet", "-identify"]
    .iter()
    .map(|s| s.to_string())
    .collect();
  if let Some(window) = window {
    args.extend(window.args());
  }
  args.extend(extra_args.iter().cloned());
  args.extend(launch_args.iter().cloned());
  args
}

/// Spawn MPlayer in slave mode with piped stdin/stdout.
///
/// The child is killed if its handle is dropped.
pub fn spawn_slave(mplayer_path: Option<&Path>, args: &[String]) -> Result<Child, ProcessError> {
  let exe = resolve(mplayer_path)?;

  log::info!("Spawning MPlayer: {:?} {:?}", exe, args);

  let child = Command::new(&exe)
    .args(args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()
    .map_err(ProcessError::SpawnFailed)?;

  Ok(child)
}

/// Run a one-shot identify pass over `file` and collect its properties.
pub async fn identify(mplayer_path: Option<&Path>, file: &Path) -> Result<Properties, ProcessError> {
  let exe = resolve(mplayer_path)?;
  log::debug!("Identifying {:?}", file);

  let mut child = Command::new(&exe)
    .args(["-quiet", "-identify", "-vo", "null", "-ao", "null", "-frames", "0"])
    .arg(file)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()
    .map_err(ProcessError::SpawnFailed)?;

  let stdout = child.stdout.take().ok_or(ProcessError::MissingPipe)?;
  let mut lines = BufReader::new(stdout).lines();
  let mut info = Properties::new();
  while let Some(line) = lines.next_line().await? {
    if let Some((key, value)) = parse_property(&line) {
      info.insert(&key, value);
    }
  }

  let status = child.wait().await?;
  log::debug!("Identify of {:?} finished with {}", file, status);
  Ok(info)
}
