//! Test utilities for uvbuild-lib.
//!
//! Process tests stand in for UV4 with small shell scripts, so they only run
//! on Unix.

use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script into `dir` to act as UV4.
///
/// `body` receives the same arguments UV4 would. `PATH` is pinned to the
/// system directories because some tests swap it out while others run.
#[cfg(unix)]
pub fn fake_uv4(dir: &Path, body: &str) -> PathBuf {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join("fake-uv4.sh");
  std::fs::write(&path, format!("#!/bin/sh\nPATH=/usr/local/bin:/usr/bin:/bin\n{}\n", body)).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
  path
}

/// Create `name` in `dir` and set its modification time to `age` ago.
pub fn write_aged(dir: &Path, name: &str, content: &[u8], age: std::time::Duration) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, content).unwrap();
  let file = std::fs::File::options().write(true).open(&path).unwrap();
  file.set_modified(std::time::SystemTime::now() - age).unwrap();
  path
}
