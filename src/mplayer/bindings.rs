//! Keybindings in MPlayer's `input.conf` format.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// MPlayer key names that differ from X keysym names.
const KEYNAMES: &[(&str, &str)] = &[
  ("space", "space"),
  ("bs", "BackSpace"),
  ("enter", "Return"),
  ("esc", "Escape"),
  ("pgup", "Prior"),
  ("pgdwn", "Next"),
  ("ins", "Insert"),
  ("kp_enter", "KP_Enter"),
  ("kp_ins", "KP_Insert"),
  ("kp_del", "KP_Delete"),
  ("kp_dec", "KP_Decimal"),
  ("del", "Delete"),
];

/// Custom action attached to a key.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// What a key does.
#[derive(Clone)]
pub enum BindingAction {
  /// Slave command sent as-is.
  Command(String),
  ToggleFullscreen,
  /// Ask the host to keep its window above others.
  KeepAbove,
  /// Show file name, position and length on the OSD.
  ShowInfo,
  /// Show the wall clock on the OSD.
  ShowClock,
  Custom(Callback),
}

impl BindingAction {
  /// Map an `input.conf` command to an action. Window-management commands
  /// can't be run by an embedded player and go to the host instead.
  pub fn from_command(command: &str) -> Self {
    if command.contains("vo_fullscreen") {
      BindingAction::ToggleFullscreen
    } else if command.contains("vo_ontop") {
      BindingAction::KeepAbove
    } else {
      BindingAction::Command(command.trim().to_string())
    }
  }
}

impl fmt::Debug for BindingAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BindingAction::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
      BindingAction::ToggleFullscreen => f.write_str("ToggleFullscreen"),
      BindingAction::KeepAbove => f.write_str("KeepAbove"),
      BindingAction::ShowInfo => f.write_str("ShowInfo"),
      BindingAction::ShowClock => f.write_str("ShowClock"),
      BindingAction::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

/// Canonical form of a key name: single characters keep their case, named
/// keys are translated from MPlayer's names and compared case-insensitively.
fn canonical_key(name: &str) -> Option<String> {
  let name = name.trim();
  let mut chars = name.chars();
  match (chars.next(), chars.next()) {
    (None, _) => None,
    (Some(_), None) => Some(name.to_string()),
    _ => {
      let lower = name.to_lowercase();
      let mapped = KEYNAMES
        .iter()
        .find(|(mplayer, _)| *mplayer == lower)
        .map(|(_, keysym)| keysym.to_lowercase())
        .unwrap_or(lower);
      Some(mapped)
    }
  }
}

/// Parse one `input.conf` line into `(key, command)`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
  if line.starts_with('#') || line.starts_with("MOUSE") || line.contains("menu") {
    return None;
  }
  let (key, command) = line.split_once(' ')?;
  let command = command.trim();
  if key.is_empty() || key.contains('#') || command.is_empty() {
    return None;
  }
  Some((key, command))
}

/// Key-to-action table.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
  actions: HashMap<String, BindingAction>,
}

impl Bindings {
  pub fn new() -> Self {
    Self::default()
  }

  /// Built-in bindings: `i` shows file info and `c` shows the time.
  pub fn with_defaults() -> Self {
    let mut bindings = Self::new();
    bindings.add_defaults();
    bindings
  }

  fn add_defaults(&mut self) {
    self.bind("i", BindingAction::ShowInfo);
    self.bind("c", BindingAction::ShowClock);
  }

  /// Load the first readable file of `paths`, then add the built-ins.
  /// Files that are not valid UTF-8 are read lossily.
  pub fn load(paths: &[PathBuf]) -> Self {
    let mut bindings = Self::new();
    for path in paths {
      match std::fs::read(path) {
        Ok(bytes) => {
          log::debug!("Reading bindings from {:?}", path);
          bindings.extend_from_input_conf(&String::from_utf8_lossy(&bytes));
          break;
        }
        Err(e) => log::debug!("Skipping bindings file {:?}: {}", path, e),
      }
    }
    bindings.add_defaults();
    bindings
  }

  pub fn extend_from_input_conf(&mut self, text: &str) {
    for (key, command) in text.lines().filter_map(parse_line) {
      self.bind(key, BindingAction::from_command(command));
    }
  }

  /// Bind `key` (a character, a keysym name or an MPlayer key name).
  pub fn bind(&mut self, key: &str, action: BindingAction) -> bool {
    match canonical_key(key) {
      Some(key) => {
        self.actions.insert(key, action);
        true
      }
      None => {
        log::debug!("Couldn't find key for {:?}", key);
        false
      }
    }
  }

  /// Bind `key` to a slave command.
  pub fn bind_command(&mut self, key: &str, command: &str) -> bool {
    self.bind(key, BindingAction::from_command(command))
  }

  /// Bind `key` to a custom callback.
  pub fn bind_fn<F>(&mut self, key: &str, f: F) -> bool
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.bind(key, BindingAction::Custom(Arc::new(f)))
  }

  /// Look up the action for a key name reported by the host.
  pub fn get(&self, key: &str) -> Option<&BindingAction> {
    canonical_key(key).and_then(|key| self.actions.get(&key))
  }

  pub fn len(&self) -> usize {
    self.actions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  const INPUT_CONF: &str = "\
# comment line
RIGHT seek +10
LEFT seek -10
bs pt_step -1
f vo_fullscreen
T vo_ontop
MOUSE_BTN0 pause
MENU menu up
p  pause
";

  #[test]
  fn test_parse_input_conf() {
    let mut bindings = Bindings::new();
    bindings.extend_from_input_conf(INPUT_CONF);

    assert!(matches!(bindings.get("Right"), Some(BindingAction::Command(c)) if c == "seek +10"));
    assert!(matches!(bindings.get("BackSpace"), Some(BindingAction::Command(c)) if c == "pt_step -1"));
    assert!(matches!(bindings.get("f"), Some(BindingAction::ToggleFullscreen)));
    assert!(matches!(bindings.get("T"), Some(BindingAction::KeepAbove)));
    assert!(matches!(bindings.get("p"), Some(BindingAction::Command(c)) if c == "pause"));
    assert!(bindings.get("MOUSE_BTN0").is_none());
    assert!(bindings.get("MENU").is_none());
    assert_eq!(bindings.len(), 6);
  }

  #[test]
  fn test_single_characters_are_case_sensitive() {
    let mut bindings = Bindings::new();
    bindings.bind_command("t", "sub_step 1");
    assert!(bindings.get("t").is_some());
    assert!(bindings.get("T").is_none());
  }

  #[test]
  fn test_mplayer_key_names() {
    let mut bindings = Bindings::new();
    bindings.bind_command("pgup", "seek 600");
    bindings.bind_command("kp_enter", "pause");
    assert!(bindings.get("Prior").is_some());
    assert!(bindings.get("KP_Enter").is_some());
    assert!(!bindings.bind_command("  ", "pause"));
  }

  #[test]
  fn test_load_uses_first_readable_file_and_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.conf");
    std::fs::write(&path, "i quit\nq quit\n").unwrap();

    let bindings = Bindings::load(&[dir.path().join("missing.conf"), path]);
    assert!(matches!(bindings.get("q"), Some(BindingAction::Command(_))));
    // Built-ins override the file.
    assert!(matches!(bindings.get("i"), Some(BindingAction::ShowInfo)));
    assert!(matches!(bindings.get("c"), Some(BindingAction::ShowClock)));
  }

  #[test]
  fn test_load_reads_latin1_file() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.conf");
    let second = dir.path().join("second.conf");
    std::fs::write(&first, b"# r\xe9glages\nq quit\n").unwrap();
    std::fs::write(&second, "w quit\n").unwrap();

    let bindings = Bindings::load(&[first, second]);
    assert!(matches!(bindings.get("q"), Some(BindingAction::Command(c)) if c == "quit"));
    assert!(bindings.get("w").is_none());
    assert_eq!(bindings.len(), 3);
  }

  #[test]
  fn test_load_skips_unreadable_paths() {
    let dir = tempfile::tempdir().unwrap();
    let second = dir.path().join("input.conf");
    std::fs::write(&second, "w quit\n").unwrap();

    // A directory can't be read as a file.
    let bindings = Bindings::load(&[dir.path().to_path_buf(), second]);
    assert!(matches!(bindings.get("w"), Some(BindingAction::Command(_))));
  }

  #[test]
  fn test_custom_callbacks() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let mut bindings = Bindings::with_defaults();
    bindings.bind_fn("x", move || {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    if let Some(BindingAction::Custom(f)) = bindings.get("x") {
      f();
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }
}
