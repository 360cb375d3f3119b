//! Locating the µVision command-line build executable.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::UV4_ENV;

/// Install locations checked when UV4 is neither configured nor on `PATH`.
pub const DEFAULT_INSTALL_PATHS: [&str; 2] = ["C:/Keil_v5/UV4/UV4.exe", "C:/Keil/UV4/UV4.exe"];

/// Executable names searched for on `PATH`.
const EXECUTABLE_NAMES: [&str; 2] = ["UV4.exe", "UV4"];

/// How the UV4 path was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uv4Source {
  /// Given on the command line or in the config file.
  Explicit,
  /// Taken from the `UVBUILD_UV4` environment variable.
  Environment,
  /// Found on the system search path.
  SearchPath,
  /// Found at a default install location.
  InstallDir,
  /// Nothing matched; the bare executable name is used and spawning decides.
  Fallback,
}

impl fmt::Display for Uv4Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Uv4Source::Explicit => "explicit",
      Uv4Source::Environment => UV4_ENV,
      Uv4Source::SearchPath => "PATH",
      Uv4Source::InstallDir => "install dir",
      Uv4Source::Fallback => "fallback",
    };
    f.write_str(s)
  }
}

/// A resolved UV4 executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uv4 {
  pub path: PathBuf,
  pub source: Uv4Source,
}

/// Find the UV4 executable.
///
/// Resolution order: explicit path, `UVBUILD_UV4`, `PATH`, default install
/// locations, then the bare name `UV4.exe`. Explicit and environment paths are
/// taken as-is without checking that they exist, so a typo surfaces as a
/// launch error naming the path the user gave.
pub fn find_uv4(explicit: Option<&Path>) -> Uv4 {
  let found = if let Some(path) = explicit {
    Uv4 {
      path: path.to_path_buf(),
      source: Uv4Source::Explicit,
    }
  } else if let Some(path) = std::env::var_os(UV4_ENV).filter(|v| !v.is_empty()) {
    Uv4 {
      path: PathBuf::from(path),
      source: Uv4Source::Environment,
    }
  } else if let Some(path) = EXECUTABLE_NAMES.iter().find_map(|name| which::which(name).ok()) {
    Uv4 {
      path,
      source: Uv4Source::SearchPath,
    }
  } else if let Some(path) = DEFAULT_INSTALL_PATHS.iter().map(PathBuf::from).find(|p| p.is_file()) {
    Uv4 {
      path,
      source: Uv4Source::InstallDir,
    }
  } else {
    Uv4 {
      path: PathBuf::from(EXECUTABLE_NAMES[0]),
      source: Uv4Source::Fallback,
    }
  };

  debug!(path = %found.path.display(), source = %found.source, "resolved UV4");
  found
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn explicit_path_wins_over_environment() {
    temp_env::with_var(UV4_ENV, Some("/from/env/UV4.exe"), || {
      let uv4 = find_uv4(Some(Path::new("/given/UV4.exe")));
      assert_eq!(uv4.path, PathBuf::from("/given/UV4.exe"));
      assert_eq!(uv4.source, Uv4Source::Explicit);
    });
  }

  #[test]
  #[serial]
  fn environment_is_used_without_explicit_path() {
    temp_env::with_var(UV4_ENV, Some("/from/env/UV4.exe"), || {
      let uv4 = find_uv4(None);
      assert_eq!(uv4.path, PathBuf::from("/from/env/UV4.exe"));
      assert_eq!(uv4.source, Uv4Source::Environment);
    });
  }

  #[cfg(unix)]
  #[test]
  #[serial]
  fn search_path_is_consulted() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::TempDir::new().unwrap();
    let exe = temp.path().join("UV4");
    std::fs::write(&exe, "#!/bin/sh\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

    temp_env::with_vars(
      [
        (UV4_ENV, None),
        ("PATH", Some(temp.path().to_str().unwrap())),
      ],
      || {
        let uv4 = find_uv4(None);
        assert_eq!(uv4.path, exe);
        assert_eq!(uv4.source, Uv4Source::SearchPath);
      },
    );
  }

  #[cfg(unix)]
  #[test]
  #[serial]
  fn falls_back_to_bare_name() {
    let temp = tempfile::TempDir::new().unwrap();

    temp_env::with_vars(
      [
        (UV4_ENV, None),
        ("PATH", Some(temp.path().to_str().unwrap())),
      ],
      || {
        let uv4 = find_uv4(None);
        assert_eq!(uv4.path, PathBuf::from("UV4.exe"));
        assert_eq!(uv4.source, Uv4Source::Fallback);
      },
    );
  }
}
