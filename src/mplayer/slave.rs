//! Background channel to a running MPlayer.
//!
//! A writer task serialises command lines onto the player's stdin, and a
//! reader task parses its stdout, folds properties into the shared
//! [`PlaybackState`] and hands answers to whoever is waiting for them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::protocol::{ProtocolError, SlaveCommand, SlaveLine};
use super::state::{PlaybackState, PlayerEvent};

#[derive(Error, Debug)]
pub enum SlaveError {
  #[error(transparent)]
  Protocol(#[from] ProtocolError),
  #[error("Failed to write to MPlayer: {0}")]
  WriteFailed(#[from] std::io::Error),
  #[error("No answer for {0}")]
  Timeout(String),
  #[error("Disconnected")]
  Disconnected,
}

/// Waiters for `ANS_<KEY>` lines, by key.
type AnswerWaiters = HashMap<String, Vec<oneshot::Sender<String>>>;

/// Writer channel message.
enum WriteMessage {
  Line(String),
  Close,
}

/// Connection to a slave-mode player over its stdio pipes.
pub struct SlaveConnection {
  answers: Arc<Mutex<AnswerWaiters>>,
  write_tx: Sender<WriteMessage>,
  finished: Arc<AtomicBool>,
  /// Set by the writer when a write to stdin fails.
  write_error: Arc<Mutex<Option<std::io::Error>>>,
  reader_handle: Mutex<Option<JoinHandle<()>>>,
  writer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SlaveConnection {
  /// Start the reader and writer tasks over the given pipes.
  pub fn setup<R, W>(
    reader: R,
    writer: W,
    playback: Arc<Mutex<PlaybackState>>,
    event_tx: Sender<PlayerEvent>,
  ) -> Self
  where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
  {
    let answers = Arc::new(Mutex::new(AnswerWaiters::new()));
    let finished = Arc::new(AtomicBool::new(false));
    let write_error = Arc::new(Mutex::new(None));
    let (write_tx, write_rx) = async_channel::unbounded::<WriteMessage>();

    let reader_answers = answers.clone();
    let reader_finished = finished.clone();
    let reader_write_tx = write_tx.clone();
    let reader_handle = tokio::spawn(async move {
      Self::reader_loop(reader, reader_answers.clone(), playback, &event_tx).await;
      reader_finished.store(true, Ordering::SeqCst);
      // Nothing can answer anymore; wake everyone waiting.
      reader_answers.lock().clear();
      reader_write_tx.close();
    });

    let writer_error = write_error.clone();
    let writer_handle = tokio::spawn(async move {
      Self::writer_loop(writer, write_rx, writer_error).await;
    });

    Self {
      answers,
      write_tx,
      finished,
      write_error,
      reader_handle: Mutex::new(Some(reader_handle)),
      writer_handle: Mutex::new(Some(writer_handle)),
    }
  }

  async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(
    reader: R,
    answers: Arc<Mutex<AnswerWaiters>>,
    playback: Arc<Mutex<PlaybackState>>,
    event_tx: &Sender<PlayerEvent>,
  ) {
    log::info!("MPlayer reader loop started");
    let mut buf_reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
      buf.clear();
      match buf_reader.read_until(b'\n', &mut buf).await {
        Ok(0) => {
          log::info!("MPlayer output closed");
          break;
        }
        Ok(_) => {
          // File names are not guaranteed to be UTF-8.
          let line = String::from_utf8_lossy(&buf);
          let line = line.trim_end();
          if line.is_empty() {
            continue;
          }

          let events = match SlaveLine::classify(line) {
            SlaveLine::Answer { key, value } => {
              log::debug!("MPlayer answer {}={}", key, value);
              if let Some(waiters) = answers.lock().remove(&key) {
                for tx in waiters {
                  let _ = tx.send(value.clone());
                }
              }
              continue;
            }
            SlaveLine::Other => {
              log::trace!("MPlayer: {}", line);
              continue;
            }
            classified => playback.lock().apply(classified),
          };

          for event in events {
            log::debug!("MPlayer reader: emitting {:?}", event);
            let _ = event_tx.send(event).await;
          }
        }
        Err(e) => {
          log::error!("MPlayer read error: {}", e);
          break;
        }
      }
    }

    let events = playback.lock().on_stopped();
    for event in events {
      let _ = event_tx.send(event).await;
    }
  }

  async fn writer_loop<W: tokio::io::AsyncWrite + Unpin>(
    mut writer: W,
    write_rx: async_channel::Receiver<WriteMessage>,
    write_error: Arc<Mutex<Option<std::io::Error>>>,
  ) {
    log::info!("MPlayer writer loop started");

    while let Ok(msg) = write_rx.recv().await {
      match msg {
        WriteMessage::Line(line) => {
          if let Err(e) = Self::write_line(&mut writer, &line).await {
            log::error!("MPlayer write error: {}", e);
            *write_error.lock() = Some(e);
            break;
          }
          log::debug!("Sent {:?}", line);
        }
        WriteMessage::Close => {
          log::info!("MPlayer writer closing");
          break;
        }
      }
    }
    write_rx.close();
  }

  async fn write_line<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    line: &str,
  ) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
  }

  /// Whether the player can still receive commands and produce output.
  pub fn is_alive(&self) -> bool {
    !self.finished.load(Ordering::SeqCst) && !self.write_tx.is_closed()
  }

  /// Queue a command for the player.
  pub async fn send(&self, cmd: &SlaveCommand) -> Result<(), SlaveError> {
    let line = cmd.to_line()?;
    log::debug!("Queueing {:?}", line);
    if self.write_tx.send(WriteMessage::Line(line)).await.is_err() {
      return Err(self.closed_error());
    }
    Ok(())
  }

  /// Why the write queue is closed: the writer's I/O error if it had one.
  fn closed_error(&self) -> SlaveError {
    match &*self.write_error.lock() {
      Some(e) => SlaveError::WriteFailed(std::io::Error::new(e.kind(), e.to_string())),
      None => SlaveError::Disconnected,
    }
  }

  /// Send a query and wait up to `timeout` for its `ANS_<key>` line.
  ///
  /// Only answers printed after the query was registered are considered.
  pub async fn query(
    &self,
    cmd: &SlaveCommand,
    key: &str,
    timeout: Duration,
  ) -> Result<String, SlaveError> {
    let (tx, rx) = oneshot::channel();
    self
      .answers
      .lock()
      .entry(key.to_string())
      .or_default()
      .push(tx);

    if let Err(e) = self.send(cmd).await {
      drop(rx);
      self.forget_closed(key);
      return Err(e);
    }

    let result = tokio::time::timeout(timeout, rx).await;
    match result {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(_)) => Err(SlaveError::Disconnected),
      Err(_) => {
        log::warn!("No answer for {} after {:?}", key, timeout);
        self.forget_closed(key);
        Err(SlaveError::Timeout(key.to_string()))
      }
    }
  }

  /// Drop waiters whose receivers are gone.
  fn forget_closed(&self, key: &str) {
    let mut answers = self.answers.lock();
    if let Some(waiters) = answers.get_mut(key) {
      waiters.retain(|tx| !tx.is_closed());
      if waiters.is_empty() {
        answers.remove(key);
      }
    }
  }

  /// Ask the writer to stop after flushing queued lines.
  pub fn close(&self) {
    let _ = self.write_tx.try_send(WriteMessage::Close);
  }

  /// Wait for both background tasks to finish.
  pub async fn join(&self) {
    let reader = self.reader_handle.lock().take();
    let writer = self.writer_handle.lock().take();
    for handle in [reader, writer].into_iter().flatten() {
      if let Err(e) = handle.await {
        log::error!("MPlayer background task failed: {}", e);
      }
    }
  }
}

impl Drop for SlaveConnection {
  fn drop(&mut self) {
    self.write_tx.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};

  struct Harness {
    conn: SlaveConnection,
    playback: Arc<Mutex<PlaybackState>>,
    events: async_channel::Receiver<PlayerEvent>,
    /// Player side of stdout.
    stdout: tokio::io::DuplexStream,
    /// Player side of stdin.
    stdin: tokio::io::DuplexStream,
  }

  fn harness() -> Harness {
    let (stdout_ours, stdout_theirs) = tokio::io::duplex(4096);
    let (stdin_ours, stdin_theirs) = tokio::io::duplex(4096);
    let playback = Arc::new(Mutex::new(PlaybackState::default()));
    let (event_tx, events) = async_channel::unbounded();
    let conn = SlaveConnection::setup(stdout_ours, stdin_ours, playback.clone(), event_tx);
    Harness {
      conn,
      playback,
      events,
      stdout: stdout_theirs,
      stdin: stdin_theirs,
    }
  }

  #[tokio::test]
  async fn test_commands_are_written_as_lines() {
    let mut h = harness();
    h.conn.send(&SlaveCommand::pause()).await.unwrap();
    h.conn.send(&SlaveCommand::pt_step(1)).await.unwrap();
    h.conn.close();
    let writer = h.conn.writer_handle.lock().take().unwrap();
    writer.await.unwrap();

    let mut written = Vec::new();
    h.stdin.read_to_end(&mut written).await.unwrap();
    assert_eq!(written, b"pause\npt_step 1\n");
  }

  #[tokio::test]
  async fn test_invalid_command_is_rejected_before_writing() {
    let h = harness();
    let err = h.conn.send(&SlaveCommand::raw("")).await.unwrap_err();
    assert!(matches!(err, SlaveError::Protocol(_)));
    assert!(h.conn.is_alive());
  }

  #[tokio::test]
  async fn test_properties_update_state_and_emit_events() {
    let mut h = harness();
    h.stdout
      .write_all(b"ID_FILENAME=/movies/a.avi\nID_LENGTH=12\nStarting playback...\n")
      .await
      .unwrap();

    assert_eq!(
      h.events.recv().await.unwrap(),
      PlayerEvent::FileChanged("/movies/a.avi".into())
    );
    assert_eq!(h.events.recv().await.unwrap(), PlayerEvent::LengthChanged(12.0));
    assert!(matches!(
      h.events.recv().await.unwrap(),
      PlayerEvent::PropertiesChanged(_)
    ));
    assert_eq!(h.playback.lock().current.length(), Some(12.0));
  }

  #[tokio::test]
  async fn test_query_resolves_with_answer() {
    let Harness {
      conn,
      mut stdout,
      mut stdin,
      ..
    } = harness();
    let cmd = SlaveCommand::new("get_time_pos").pausing_keep_default();
    let query = conn.query(&cmd, "TIME_POSITION", Duration::from_secs(5));
    let player = async {
      let mut buf = [0u8; 26];
      stdin.read_exact(&mut buf).await.unwrap();
      assert_eq!(&buf, b"pausing_keep get_time_pos\n");
      stdout.write_all(b"ANS_TIME_POSITION=42.5\n").await.unwrap();
    };
    let (answer, _) = tokio::join!(query, player);
    assert_eq!(answer.unwrap(), "42.5");
  }

  #[tokio::test]
  async fn test_one_answer_resolves_every_waiter() {
    let Harness {
      conn,
      mut stdout,
      mut stdin,
      ..
    } = harness();
    let cmd = SlaveCommand::new("get_percent_pos");
    let first = conn.query(&cmd, "PERCENT_POSITION", Duration::from_secs(5));
    let second = conn.query(&cmd, "PERCENT_POSITION", Duration::from_secs(5));
    let player = async {
      let mut buf = [0u8; 32];
      stdin.read_exact(&mut buf).await.unwrap();
      assert_eq!(&buf, b"get_percent_pos\nget_percent_pos\n");
      stdout.write_all(b"ANS_PERCENT_POSITION=13\n").await.unwrap();
    };
    let (first, second, _) = tokio::join!(first, second, player);
    assert_eq!(first.unwrap(), "13");
    assert_eq!(second.unwrap(), "13");
    assert!(conn.answers.lock().is_empty());
  }

  #[tokio::test]
  async fn test_earlier_answer_does_not_resolve_query() {
    let mut h = harness();
    h.stdout.write_all(b"ANS_TIME_POSITION=1.0\n").await.unwrap();
    // A property line after the answer tells us the reader has consumed it.
    h.stdout.write_all(b"ID_LENGTH=12.00\n").await.unwrap();
    assert_eq!(h.events.recv().await.unwrap(), PlayerEvent::LengthChanged(12.0));

    let err = h
      .conn
      .query(
        &SlaveCommand::new("get_time_pos"),
        "TIME_POSITION",
        Duration::from_millis(50),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, SlaveError::Timeout(key) if key == "TIME_POSITION"));
  }

  #[tokio::test]
  async fn test_write_failure_is_reported() {
    let h = harness();
    drop(h.stdin);

    let err = tokio::time::timeout(Duration::from_secs(5), async {
      loop {
        match h.conn.send(&SlaveCommand::pause()).await {
          Err(e) => break e,
          Ok(()) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
      }
    })
    .await
    .unwrap();
    assert!(matches!(err, SlaveError::WriteFailed(_)), "{:?}", err);
    assert!(!h.conn.is_alive());
    assert!(matches!(
      h.conn
        .query(&SlaveCommand::new("get_time_pos"), "TIME_POSITION", Duration::from_secs(1))
        .await,
      Err(SlaveError::WriteFailed(_))
    ));
  }

  #[tokio::test]
  async fn test_query_times_out() {
    let h = harness();
    let err = h
      .conn
      .query(
        &SlaveCommand::new("get_percent_pos"),
        "PERCENT_POSITION",
        Duration::from_millis(20),
      )
      .await
      .unwrap_err();
    assert!(matches!(err, SlaveError::Timeout(_)));
    assert!(h.conn.answers.lock().is_empty());
  }

  #[tokio::test]
  async fn test_eof_stops_connection() {
    let h = harness();
    drop(h.stdout);

    assert_eq!(h.events.recv().await.unwrap(), PlayerEvent::Stopped);
    h.conn.join().await;
    assert!(!h.conn.is_alive());
    assert!(matches!(
      h.conn.send(&SlaveCommand::pause()).await,
      Err(SlaveError::Disconnected)
    ));
  }
}
