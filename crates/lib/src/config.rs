//! Build policy configuration.
//!
//! Every knob has a default, so the config file is optional. When present it
//! is `uvbuild.json` in the working directory, or whatever `UVBUILD_CONFIG`
//! points at.
//!
//! ```json
//! {
//!   "uv4": "D:/Keil_v5/UV4/UV4.exe",
//!   "success_exit_codes": [0, 1],
//!   "timeout_secs": 600
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_ENV, CONFIG_FILENAME, LOG_FILENAME, TOOL_OUTPUT_FILENAME};

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("invalid config {}: {source}", path.display())]
  Parse { path: PathBuf, source: serde_json::Error },

  #[error("invalid {field} pattern '{pattern}': {source}")]
  Pattern {
    field: &'static str,
    pattern: String,
    source: regex::Error,
  },
}

/// Policy for invoking UV4 and judging its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Path to UV4.exe. Overrides environment and search path lookup.
  pub uv4: Option<PathBuf>,
  /// Log file name, relative to the working directory.
  pub log_file: PathBuf,
  /// File passed to UV4 via `-o`, relative to the working directory.
  /// `null` disables the flag and the listing follower.
  pub tool_output: Option<PathBuf>,
  /// A line matching any of these marks the build as failed.
  pub fatal_patterns: Vec<String>,
  /// Lines matching these are collected as warnings.
  pub warning_patterns: Vec<String>,
  /// Exit codes accepted as success, provided no fatal line was seen.
  pub success_exit_codes: Vec<i32>,
  /// Artifact extensions, without the dot.
  pub artifact_extensions: Vec<String>,
  /// Conventional output directories, relative to the project file.
  pub output_dirs: Vec<PathBuf>,
  /// Kill the build after this many seconds.
  pub timeout_secs: Option<u64>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      uv4: None,
      log_file: PathBuf::from(LOG_FILENAME),
      tool_output: Some(PathBuf::from(TOOL_OUTPUT_FILENAME)),
      fatal_patterns: vec![
        r"(?i)\b(fatal\s+)?error\b\s*:".to_string(),
        r"\b[1-9]\d*\s+Error\(s\)".to_string(),
        r"(?i)\btarget not created\b".to_string(),
      ],
      warning_patterns: vec![r"(?i)\bwarning\b\s*:".to_string()],
      success_exit_codes: vec![0],
      artifact_extensions: vec!["hex".to_string(), "bin".to_string()],
      output_dirs: vec![PathBuf::from("Objects"), PathBuf::from("Output"), PathBuf::from("Obj")],
      timeout_secs: None,
    }
  }
}

impl Config {
  /// Load the config for a working directory.
  ///
  /// `UVBUILD_CONFIG` names an explicit file, which must exist. Otherwise
  /// `uvbuild.json` in `dir` is used if present, and defaults if not.
  pub fn load(dir: &Path) -> Result<Self, ConfigError> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
      let path = PathBuf::from(path);
      let path = if path.is_absolute() { path } else { dir.join(path) };
      return Self::from_file(&path);
    }

    let path = dir.join(CONFIG_FILENAME);
    if path.is_file() {
      return Self::from_file(&path);
    }

    debug!(dir = %dir.display(), "no config file, using defaults");
    Ok(Self::default())
  }

  /// Read a config file. Missing fields take their defaults.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    let config: Config = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
      path: path.to_path_buf(),
      source: e,
    })?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_secs.map(Duration::from_secs)
  }

  /// Whether a file name carries one of the artifact extensions.
  pub fn is_artifact(&self, path: &Path) -> bool {
    path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|ext| self.artifact_extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
  }
}
