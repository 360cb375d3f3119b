//! Types for build requests and results.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::diagnostics::{BuildSummary, Diagnostic, Severity};

/// What to build. Built once from command-line input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
  pub project: PathBuf,
  pub target: Option<String>,
  /// Parallel jobs passed to UV4 as `-jN`. `0` lets UV4 use all cores.
  pub jobs: Option<u32>,
}

impl BuildRequest {
  pub fn new(project: impl Into<PathBuf>) -> Self {
    Self {
      project: project.into(),
      target: None,
      jobs: None,
    }
  }

  pub fn with_target(mut self, target: Option<String>) -> Self {
    self.target = target;
    self
  }

  pub fn with_jobs(mut self, jobs: Option<u32>) -> Self {
    self.jobs = jobs;
    self
  }
}

/// How a build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
  /// Accepted exit code and no fatal line in the output.
  Succeeded,
  /// The tool reported or implied failure.
  Failed,
  /// Cancelled by the user; the tool was killed.
  Interrupted,
  /// The configured timeout elapsed; the tool was killed.
  TimedOut,
}

impl fmt::Display for BuildOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      BuildOutcome::Succeeded => "succeeded",
      BuildOutcome::Failed => "failed",
      BuildOutcome::Interrupted => "interrupted",
      BuildOutcome::TimedOut => "timed out",
    };
    f.write_str(s)
  }
}

/// Result of one supervised build.
#[derive(Debug)]
pub struct BuildResult {
  pub outcome: BuildOutcome,
  /// Exit code of the tool. `None` if it was killed or died by a signal.
  pub exit_code: Option<i32>,
  /// Warning and error lines, in output order.
  pub diagnostics: Vec<Diagnostic>,
  /// The tool's closing summary line, if it printed one.
  pub summary: Option<BuildSummary>,
  /// Number of output lines relayed.
  pub lines: usize,
  pub started_at: SystemTime,
  pub duration: Duration,
  /// Artifacts copied into the working directory.
  pub artifacts: Vec<PathBuf>,
  /// Per-file problems while staging artifacts. These never fail the build.
  pub artifact_errors: Vec<ArtifactError>,
}

impl BuildResult {
  pub fn is_success(&self) -> bool {
    self.outcome == BuildOutcome::Succeeded
  }

  pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
    self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
  }

  pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
    self.diagnostics.iter().filter(|d| d.severity == Severity::Warning)
  }
}

/// Errors that abort a build before it can produce a result.
#[derive(Debug, Error)]
pub enum BuildError {
  /// UV4 could not be started.
  #[error("failed to launch {}: {source}", program.display())]
  Launch { program: PathBuf, source: std::io::Error },

  /// Waiting on the child process failed.
  #[error("io error while supervising build: {0}")]
  Io(#[from] std::io::Error),
}
