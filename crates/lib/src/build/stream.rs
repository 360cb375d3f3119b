//! Line producers feeding the build supervisor.
//!
//! stdout and stderr each get their own reader task, so a chatty stream can
//! never stall the child on a full pipe while the other one is being read.
//! µVision's `-o` listing file is followed by a third task. All of them push
//! complete lines into one channel.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// How often the listing file is polled for new content.
pub const LISTING_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Where a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
  Stdout,
  Stderr,
  Listing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
  pub stream: Stream,
  pub text: String,
}

/// Decode one raw line, dropping the line terminator.
///
/// Tool output is not guaranteed to be UTF-8, so invalid bytes are replaced
/// rather than treated as errors.
fn decode_line(raw: &[u8]) -> String {
  let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
  let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
  String::from_utf8_lossy(raw).into_owned()
}

/// Read `reader` to EOF, sending each line tagged with `stream`.
pub fn spawn_pipe_reader<R>(reader: R, stream: Stream, tx: mpsc::Sender<OutputLine>) -> JoinHandle<()>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
      buf.clear();
      match reader.read_until(b'\n', &mut buf).await {
        Ok(0) => break,
        Ok(_) => {
          let line = OutputLine {
            stream,
            text: decode_line(&buf),
          };
          if tx.send(line).await.is_err() {
            break;
          }
        }
        Err(e) => {
          debug!(?stream, error = %e, "pipe read failed");
          break;
        }
      }
    }
    trace!(?stream, "pipe reader finished");
  })
}

/// Incremental reader over a file another process is appending to.
#[derive(Debug)]
struct FileFollower {
  path: PathBuf,
  pos: u64,
  pending: Vec<u8>,
}

impl FileFollower {
  fn new(path: PathBuf) -> Self {
    Self {
      path,
      pos: 0,
      pending: Vec::new(),
    }
  }

  /// Read whatever was appended since the last poll and return the complete
  /// lines. A trailing partial line is held back until its newline arrives.
  async fn poll(&mut self) -> Vec<String> {
    let Ok(mut file) = tokio::fs::File::open(&self.path).await else {
      return Vec::new();
    };
    let Ok(meta) = file.metadata().await else {
      return Vec::new();
    };

    // The tool recreated the file; start over.
    if meta.len() < self.pos {
      self.pos = 0;
      self.pending.clear();
    }
    if meta.len() == self.pos {
      return Vec::new();
    }

    if file.seek(SeekFrom::Start(self.pos)).await.is_err() {
      return Vec::new();
    }
    let mut chunk = Vec::new();
    match file.read_to_end(&mut chunk).await {
      Ok(n) => self.pos += n as u64,
      Err(e) => {
        debug!(path = %self.path.display(), error = %e, "listing read failed");
        return Vec::new();
      }
    }
    self.pending.extend_from_slice(&chunk);

    let mut lines = Vec::new();
    while let Some(idx) = self.pending.iter().position(|&b| b == b'\n') {
      let rest = self.pending.split_off(idx + 1);
      lines.push(decode_line(&self.pending));
      self.pending = rest;
    }
    lines
  }

  /// Whatever is left once the writer is gone, as a final line.
  fn finish(&mut self) -> Option<String> {
    if self.pending.is_empty() {
      return None;
    }
    let line = decode_line(&self.pending);
    self.pending.clear();
    Some(line)
  }
}

/// Follow the listing file at `path` until `stop` fires, then read it one
/// last time and exit.
pub fn spawn_listing_follower(
  path: PathBuf,
  tx: mpsc::Sender<OutputLine>,
  mut stop: oneshot::Receiver<()>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut follower = FileFollower::new(path);
    let mut ticker = tokio::time::interval(LISTING_POLL_INTERVAL);
    let mut stopping = false;

    loop {
      tokio::select! {
        _ = ticker.tick() => {}
        _ = &mut stop, if !stopping => stopping = true,
      }

      let mut lines = follower.poll().await;
      if stopping {
        lines.extend(follower.finish());
      }
      for text in lines {
        let line = OutputLine {
          stream: Stream::Listing,
          text,
        };
        if tx.send(line).await.is_err() {
          return;
        }
      }
      if stopping {
        break;
      }
    }
    trace!("listing follower finished");
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::TempDir;

  #[test]
  fn decode_strips_crlf_and_replaces_invalid_bytes() {
    assert_eq!(decode_line(b"compiling main.c...\r\n"), "compiling main.c...");
    assert_eq!(decode_line(b"no newline"), "no newline");
    assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
  }

  #[tokio::test]
  async fn pipe_reader_sends_every_line() {
    let (tx, mut rx) = mpsc::channel(8);
    let input: &'static [u8] = b"one\r\ntwo\nthree";
    spawn_pipe_reader(input, Stream::Stderr, tx).await.unwrap();

    let mut got = Vec::new();
    while let Some(line) = rx.recv().await {
      assert_eq!(line.stream, Stream::Stderr);
      got.push(line.text);
    }
    assert_eq!(got, vec!["one", "two", "three"]);
  }

  #[tokio::test]
  async fn follower_holds_back_partial_lines() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("listing.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    let mut follower = FileFollower::new(path.clone());

    assert!(follower.poll().await.is_empty());

    file.write_all(b"Build target 'Debug'\r\ncompil").unwrap();
    assert_eq!(follower.poll().await, vec!["Build target 'Debug'"]);

    file.write_all(b"ing main.c...\nlinking").unwrap();
    assert_eq!(follower.poll().await, vec!["compiling main.c..."]);
    assert_eq!(follower.finish().as_deref(), Some("linking"));
    assert_eq!(follower.finish(), None);
  }

  #[tokio::test]
  async fn follower_restarts_when_file_is_recreated() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("listing.txt");
    std::fs::write(&path, "old line one\nold line two\n").unwrap();
    let mut follower = FileFollower::new(path.clone());
    assert_eq!(follower.poll().await.len(), 2);

    std::fs::write(&path, "new\n").unwrap();
    assert_eq!(follower.poll().await, vec!["new"]);
  }

  #[tokio::test]
  async fn listing_follower_flushes_on_stop() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("listing.txt");
    std::fs::write(&path, "a\nb\ntail").unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let (stop_tx, stop_rx) = oneshot::channel();
    let handle = spawn_listing_follower(path, tx, stop_rx);
    stop_tx.send(()).unwrap();
    handle.await.unwrap();

    let mut got = Vec::new();
    while let Some(line) = rx.recv().await {
      got.push(line.text);
    }
    assert_eq!(got, vec!["a", "b", "tail"]);
  }
}
