//! Best-effort append-only build log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Appends relayed output lines to the log file.
///
/// Logging never fails a build. The first I/O error is reported as a warning
/// and the sink turns itself off.
#[derive(Debug)]
pub struct LogSink {
  path: PathBuf,
  file: Option<File>,
}

impl LogSink {
  /// Open `path` for appending, creating it if needed.
  pub fn open(path: &Path) -> Self {
    let file = match OpenOptions::new().create(true).append(true).open(path) {
      Ok(file) => Some(file),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "cannot open build log, continuing without it");
        None
      }
    };
    Self {
      path: path.to_path_buf(),
      file,
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.file.is_some()
  }

  /// Append one line. Text and newline go out in a single write, so the log
  /// only ever holds whole lines.
  pub fn write_line(&mut self, line: &str) {
    let Some(file) = self.file.as_mut() else {
      return;
    };

    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');

    if let Err(e) = file.write_all(buf.as_bytes()) {
      warn!(path = %self.path.display(), error = %e, "build log write failed, disabling log");
      self.file = None;
    }
  }

  /// Flush and close the log.
  pub fn close(mut self) {
    if let Some(mut file) = self.file.take() {
      if let Err(e) = file.flush().and_then(|_| file.sync_all()) {
        warn!(path = %self.path.display(), error = %e, "failed to flush build log");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;
  use tracing_test::traced_test;

  #[test]
  fn lines_are_appended_across_sessions() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("build.log");

    let mut log = LogSink::open(&path);
    log.write_line("first");
    log.close();

    let mut log = LogSink::open(&path);
    log.write_line("second");
    log.write_line("");
    log.close();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n\n");
  }

  #[test]
  #[traced_test]
  fn unopenable_log_is_disabled_not_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("missing-dir").join("build.log");

    let mut log = LogSink::open(&path);
    assert!(!log.is_enabled());
    log.write_line("ignored");
    log.close();

    assert!(!path.exists());
    assert!(logs_contain("cannot open build log"));
  }

  #[cfg(target_os = "linux")]
  #[test]
  #[traced_test]
  fn write_failure_disables_log_and_carries_on() {
    // Every write to /dev/full fails with ENOSPC.
    let mut log = LogSink::open(Path::new("/dev/full"));
    assert!(log.is_enabled());

    log.write_line("first");
    assert!(!log.is_enabled());
    log.write_line("second");
    log.close();

    assert!(logs_contain("build log write failed"));
  }
}
