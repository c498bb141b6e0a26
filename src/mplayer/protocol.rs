//! MPlayer slave-mode line protocol.
//!
//! Commands are single lines written to the player's stdin. Output lines are
//! either `ANS_<KEY>=<value>` answers to `get_*` queries, identify properties
//! (`ID_LENGTH=93.00`, `Selected video codec: ...`) or noise.
//!
//! Reference: http://www.mplayerhq.hu/DOCS/tech/slave.txt

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker printed once the player has opened the file and starts rendering.
pub const PLAYBACK_STARTED: &str = "Starting playback...";

static PROPERTY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^([a-z_ ]+)[=:](.+)$").unwrap());
static ANSWER_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ANS_(\w+)=(.*)$").unwrap());
static ID_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ID_(\w+)$").unwrap());
static CODEC_KEY: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^Selected (audio|video) codec$").unwrap());
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+$").unwrap());

#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
  #[error("Invalid command: {0}")]
  InvalidCommand(String),
}

/// A single command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
  Str(String),
  Int(i64),
  Float(f64),
}

impl fmt::Display for Arg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Arg::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
      Arg::Int(i) => write!(f, "{}", i),
      // Debug keeps the fractional part: 1.0 instead of 1
      Arg::Float(x) => write!(f, "{:?}", x),
    }
  }
}

impl From<&str> for Arg {
  fn from(value: &str) -> Self {
    Arg::Str(value.to_string())
  }
}

impl From<String> for Arg {
  fn from(value: String) -> Self {
    Arg::Str(value)
  }
}

impl From<i64> for Arg {
  fn from(value: i64) -> Self {
    Arg::Int(value)
  }
}

impl From<i32> for Arg {
  fn from(value: i32) -> Self {
    Arg::Int(value as i64)
  }
}

impl From<u32> for Arg {
  fn from(value: u32) -> Self {
    Arg::Int(value as i64)
  }
}

impl From<f64> for Arg {
  fn from(value: f64) -> Self {
    Arg::Float(value)
  }
}

/// Pausing prefix controlling how a command interacts with the pause state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pausing {
  /// Pause after the command.
  Pause,
  /// Keep the current pause state.
  Keep,
  /// Toggle the pause state after the command.
  Toggle,
  /// Keep the pause state even for commands that would unpause.
  KeepForce,
}

impl Pausing {
  pub fn prefix(self) -> &'static str {
    match self {
      Pausing::Pause => "pausing",
      Pausing::Keep => "pausing_keep",
      Pausing::Toggle => "pausing_toggle",
      Pausing::KeepForce => "pausing_keep_force",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
  Raw(String),
  Named { name: String, args: Vec<Arg> },
}

/// Command sent to MPlayer on stdin.
#[derive(Debug, Clone, PartialEq)]
pub struct SlaveCommand {
  body: Body,
  pausing: Option<Pausing>,
}

impl SlaveCommand {
  /// A command by name, arguments added with [`SlaveCommand::arg`].
  pub fn new(name: &str) -> Self {
    Self {
      body: Body::Named {
        name: name.to_string(),
        args: Vec::new(),
      },
      pausing: None,
    }
  }

  /// A pre-formatted command line, sent verbatim.
  pub fn raw(line: &str) -> Self {
    Self {
      body: Body::Raw(line.trim().to_string()),
      pausing: None,
    }
  }

  pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
    if let Body::Named { args, .. } = &mut self.body {
      args.push(arg.into());
    }
    self
  }

  pub fn pausing(mut self, mode: Pausing) -> Self {
    self.pausing = Some(mode);
    self
  }

  /// Keep pause state unless the caller already picked a mode.
  pub fn pausing_keep_default(self) -> Self {
    if self.pausing.is_some() {
      self
    } else {
      self.pausing(Pausing::Keep)
    }
  }

  /// Quit MPlayer.
  pub fn quit() -> Self {
    Self::new("quit")
  }

  /// Toggle pause.
  pub fn pause() -> Self {
    Self::new("pause")
  }

  /// Toggle audio output.
  pub fn mute() -> Self {
    Self::new("mute")
  }

  /// Step through the playlist; negative steps go back.
  pub fn pt_step(step: i64) -> Self {
    Self::new("pt_step").arg(step)
  }

  /// Relative seek in seconds, keeping the pause state.
  pub fn seek(step: f64) -> Self {
    Self::new("seek").arg(step).pausing(Pausing::Keep)
  }

  /// Replace the playlist with the entries listed in `path`.
  pub fn loadlist(path: &str) -> Self {
    Self::new("loadlist").arg(path)
  }

  pub fn loadfile(path: &str) -> Self {
    Self::new("loadfile").arg(path)
  }

  /// Show text on the OSD for `duration_ms`.
  pub fn osd_show_text(text: &str, duration_ms: u32) -> Self {
    Self::new("osd_show_text")
      .arg(text)
      .arg(duration_ms)
      .pausing(Pausing::Keep)
  }

  pub fn get_property(name: &str) -> Self {
    Self::new("get_property").arg(name)
  }

  /// Render the command as a protocol line, without the trailing newline.
  pub fn to_line(&self) -> Result<String, ProtocolError> {
    let body = match &self.body {
      Body::Raw(line) => line.clone(),
      Body::Named { name, args } => {
        let mut line = name.clone();
        for arg in args {
          line.push(' ');
          line.push_str(&arg.to_string());
        }
        line
      }
    };

    if body.is_empty() {
      return Err(ProtocolError::InvalidCommand("empty command".into()));
    }
    if body.contains(['\n', '\r']) {
      return Err(ProtocolError::InvalidCommand(format!(
        "line break in command {:?}",
        body
      )));
    }

    Ok(match self.pausing {
      Some(mode) => format!("{} {}", mode.prefix(), body),
      None => body,
    })
  }
}

impl From<&str> for SlaveCommand {
  fn from(line: &str) -> Self {
    SlaveCommand::raw(line)
  }
}

/// Typed property value parsed from identify output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
  Int(i64),
  Float(f64),
  Text(String),
}

impl PropertyValue {
  fn parse(raw: &str) -> Self {
    if INTEGER.is_match(raw) {
      if let Ok(i) = raw.parse() {
        return PropertyValue::Int(i);
      }
    }
    if DECIMAL.is_match(raw) {
      if let Ok(x) = raw.parse() {
        return PropertyValue::Float(x);
      }
    }
    PropertyValue::Text(raw.to_string())
  }

  /// Numeric view of the value.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      PropertyValue::Int(i) => Some(*i as f64),
      PropertyValue::Float(x) => Some(*x),
      PropertyValue::Text(_) => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      PropertyValue::Text(s) => Some(s),
      _ => None,
    }
  }

  fn is_blank(&self) -> bool {
    match self {
      PropertyValue::Int(i) => *i == 0,
      PropertyValue::Float(x) => *x == 0.0,
      PropertyValue::Text(s) => s.is_empty(),
    }
  }
}

impl fmt::Display for PropertyValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PropertyValue::Int(i) => write!(f, "{}", i),
      PropertyValue::Float(x) => write!(f, "{}", x),
      PropertyValue::Text(s) => f.write_str(s),
    }
  }
}

/// Parse an identify property line into a `(key, value)` pair.
///
/// Returns `None` for lines that aren't known properties and for zero or
/// empty values, which MPlayer prints for unknown fields.
pub fn parse_property(line: &str) -> Option<(String, PropertyValue)> {
  let caps = PROPERTY_LINE.captures(line)?;
  let key = caps[1].trim();
  let mut value = caps[2].trim().to_string();

  let key = if let Some(id) = ID_KEY.captures(key) {
    match &id[1] {
      "VIDEO_WIDTH" => "WIDTH".to_string(),
      "VIDEO_HEIGHT" => "HEIGHT".to_string(),
      other => other.to_string(),
    }
  } else if key == "Language" {
    if let Some(idx) = value.find('[') {
      if idx > 0 {
        value = value[..idx].trim_end().to_string();
      }
    }
    key.to_string()
  } else if let Some(codec) = CODEC_KEY.captures(key) {
    if let (Some(open), Some(close)) = (value.find('('), value.rfind(')')) {
      if open < close {
        value = value[open + 1..close].to_string();
      }
    }
    format!("{}_codec", &codec[1])
  } else {
    return None;
  };

  let value = PropertyValue::parse(&value);
  if value.is_blank() {
    return None;
  }
  Some((key.to_lowercase(), value))
}

/// Classified line of MPlayer output.
#[derive(Debug, Clone, PartialEq)]
pub enum SlaveLine {
  /// The file is loaded and all identify properties have been printed.
  PlaybackStarted,
  /// Answer to a `get_*` query, e.g. `ANS_TIME_POSITION=12.3`.
  Answer { key: String, value: String },
  Property { key: String, value: PropertyValue },
  Other,
}

impl SlaveLine {
  /// Classify a line read from the player (without line terminator).
  pub fn classify(line: &str) -> Self {
    let line = line.trim_end_matches(['\r', '\n']);
    if line == PLAYBACK_STARTED {
      return SlaveLine::PlaybackStarted;
    }
    if let Some(caps) = ANSWER_LINE.captures(line) {
      return SlaveLine::Answer {
        key: caps[1].to_string(),
        value: caps[2].trim().trim_matches('\'').to_string(),
      };
    }
    match parse_property(line) {
      Some((key, value)) => SlaveLine::Property { key, value },
      None => SlaveLine::Other,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_command_formatting() {
    assert_eq!(SlaveCommand::pause().to_line().unwrap(), "pause");
    assert_eq!(SlaveCommand::pt_step(-2).to_line().unwrap(), "pt_step -2");
    assert_eq!(
      SlaveCommand::seek(10.0).to_line().unwrap(),
      "pausing_keep seek 10.0"
    );
    assert_eq!(
      SlaveCommand::raw("  seek 10 ").pausing(Pausing::Pause).to_line().unwrap(),
      "pausing seek 10"
    );
  }

  #[test]
  fn test_string_args_are_quoted() {
    let cmd = SlaveCommand::osd_show_text(r#"say "hi""#, 3000);
    assert_eq!(
      cmd.to_line().unwrap(),
      r#"pausing_keep osd_show_text "say \"hi\"" 3000"#
    );
    let cmd = SlaveCommand::loadlist("/tmp/my list.txt");
    assert_eq!(cmd.to_line().unwrap(), r#"loadlist "/tmp/my list.txt""#);
  }

  #[test]
  fn test_invalid_commands() {
    assert!(SlaveCommand::raw("").to_line().is_err());
    assert!(SlaveCommand::loadfile("a\nquit").to_line().is_err());
  }

  #[test]
  fn test_pausing_default_keeps_explicit_mode() {
    let cmd = SlaveCommand::pause().pausing(Pausing::Toggle).pausing_keep_default();
    assert_eq!(cmd.to_line().unwrap(), "pausing_toggle pause");
    let cmd = SlaveCommand::new("get_time_pos").pausing_keep_default();
    assert_eq!(cmd.to_line().unwrap(), "pausing_keep get_time_pos");
  }

  #[test]
  fn test_parse_id_properties() {
    assert_eq!(
      parse_property("ID_LENGTH=93.00"),
      Some(("length".into(), PropertyValue::Float(93.0)))
    );
    assert_eq!(
      parse_property("ID_VIDEO_WIDTH=720"),
      Some(("width".into(), PropertyValue::Int(720)))
    );
    assert_eq!(
      parse_property("ID_VIDEO_HEIGHT=576"),
      Some(("height".into(), PropertyValue::Int(576)))
    );
    assert_eq!(
      parse_property("ID_FILENAME=/movies/a b.ogm"),
      Some(("filename".into(), PropertyValue::Text("/movies/a b.ogm".into())))
    );
    assert_eq!(
      parse_property("ID_VIDEO_FORMAT=XVID"),
      Some(("video_format".into(), PropertyValue::Text("XVID".into())))
    );
  }

  #[test]
  fn test_zero_and_unknown_values_are_dropped() {
    assert_eq!(parse_property("ID_VIDEO_ASPECT=0.0000"), None);
    assert_eq!(parse_property("ID_AUDIO_ID=0"), None);
    assert_eq!(parse_property("Playing foo.avi."), None);
    assert_eq!(parse_property("VO: [xv] 720x576 => 1024x576"), None);
  }

  #[test]
  fn test_parse_language_and_codecs() {
    assert_eq!(
      parse_property("Language: eng [default]"),
      Some(("language".into(), PropertyValue::Text("eng".into())))
    );
    assert_eq!(
      parse_property("Selected video codec: [ffodivx] vfm: ffmpeg (FFmpeg MPEG-4)"),
      Some(("video_codec".into(), PropertyValue::Text("FFmpeg MPEG-4".into())))
    );
    assert_eq!(
      parse_property("Selected audio codec: [mp3] afm: mp3lib (mp3lib MPEG layer-2, layer-3)"),
      Some((
        "audio_codec".into(),
        PropertyValue::Text("mp3lib MPEG layer-2, layer-3".into())
      ))
    );
  }

  #[test]
  fn test_answer_quotes_are_stripped() {
    assert_eq!(
      SlaveLine::classify("ANS_FILENAME='clip.avi'"),
      SlaveLine::Answer {
        key: "FILENAME".into(),
        value: "clip.avi".into()
      }
    );
  }

  #[test]
  fn test_classify_lines() {
    assert_eq!(
      SlaveLine::classify("Starting playback...\n"),
      SlaveLine::PlaybackStarted
    );
    assert_eq!(
      SlaveLine::classify("ANS_TIME_POSITION=12.3"),
      SlaveLine::Answer {
        key: "TIME_POSITION".into(),
        value: "12.3".into()
      }
    );
    assert_eq!(
      SlaveLine::classify("ID_VIDEO_ASPECT=1.7778"),
      SlaveLine::Property {
        key: "video_aspect".into(),
        value: PropertyValue::Float(1.7778)
      }
    );
    assert_eq!(SlaveLine::classify("A:   1.2 V:   1.2"), SlaveLine::Other);
  }
}
