//! The build runner: locate a project, build it, stage its artifacts.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::artifacts::{self, ArtifactError, ArtifactReport, ArtifactSearch};
use crate::build::{self, BuildContext, BuildError, BuildRequest, BuildResult};
use crate::config::{Config, ConfigError};
use crate::diagnostics::DiagnosticMatcher;
use crate::project::{self, ProjectError};
use crate::toolchain::{Uv4, find_uv4};

/// Supervises UV4 builds in one working directory.
#[derive(Debug, Clone)]
pub struct Runner {
  workdir: PathBuf,
  config: Config,
  matcher: DiagnosticMatcher,
  uv4: Uv4,
  echo: bool,
}

impl Runner {
  /// Create a runner for `workdir`.
  ///
  /// UV4 is resolved from `config.uv4` or the usual lookup.
  ///
  /// # Errors
  ///
  /// Returns an error if a configured pattern is not a valid regex.
  pub fn new(workdir: impl Into<PathBuf>, config: Config) -> Result<Self, ConfigError> {
    let matcher = DiagnosticMatcher::from_config(&config)?;
    let uv4 = find_uv4(config.uv4.as_deref());
    Ok(Self {
      workdir: workdir.into(),
      config,
      matcher,
      uv4,
      echo: true,
    })
  }

  /// Use a specific UV4 executable, overriding config and lookup.
  pub fn with_uv4(mut self, path: &Path) -> Self {
    self.uv4 = find_uv4(Some(path));
    self
  }

  /// Whether build output is relayed to the console.
  pub fn with_echo(mut self, echo: bool) -> Self {
    self.echo = echo;
    self
  }

  pub fn workdir(&self) -> &Path {
    &self.workdir
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn uv4(&self) -> &Uv4 {
    &self.uv4
  }

  /// Path of the build log.
  pub fn log_path(&self) -> PathBuf {
    self.workdir.join(&self.config.log_file)
  }

  /// Find the project to build. See [`project::locate_project`].
  pub fn locate_project(&self, explicit: Option<&Path>) -> Result<PathBuf, ProjectError> {
    project::locate_project(&self.workdir, explicit)
  }

  /// Build without staging artifacts. Ctrl-C interrupts the build.
  pub async fn build(&self, request: &BuildRequest) -> Result<BuildResult, BuildError> {
    self.build_until(request, interrupted()).await
  }

  /// Build without staging artifacts, stopping early if `cancel` completes.
  pub async fn build_until<F>(&self, request: &BuildRequest, cancel: F) -> Result<BuildResult, BuildError>
  where
    F: Future<Output = ()>,
  {
    let ctx = BuildContext {
      uv4: &self.uv4.path,
      workdir: &self.workdir,
      config: &self.config,
      matcher: &self.matcher,
      echo: self.echo,
    };
    build::execute(request, &ctx, cancel).await
  }

  /// Copy fresh artifacts of a finished build into the working directory.
  pub fn collect_artifacts(&self, request: &BuildRequest, result: &BuildResult) -> ArtifactReport {
    let search = ArtifactSearch::resolve(
      &request.project,
      request.target.as_deref(),
      result.summary.as_ref(),
      &self.config,
    );
    if search.dirs.is_empty() {
      return ArtifactReport {
        errors: vec![ArtifactError::NoOutputDir {
          project: request.project.clone(),
        }],
        ..ArtifactReport::default()
      };
    }

    let mut report = artifacts::collect_artifacts(&search, result.started_at, &self.workdir, &self.config);
    if report.copied.is_empty() && report.errors.is_empty() {
      report.errors.push(ArtifactError::NoneFound {
        searched: report.searched.clone(),
      });
    }
    report
  }

  /// Build, then stage artifacts if the build succeeded. Ctrl-C interrupts.
  pub async fn run(&self, request: &BuildRequest) -> Result<BuildResult, BuildError> {
    self.run_until(request, interrupted()).await
  }

  /// Like [`Runner::run`], stopping early if `cancel` completes.
  pub async fn run_until<F>(&self, request: &BuildRequest, cancel: F) -> Result<BuildResult, BuildError>
  where
    F: Future<Output = ()>,
  {
    let mut result = self.build_until(request, cancel).await?;
    if !result.is_success() {
      return Ok(result);
    }

    let report = self.collect_artifacts(request, &result);
    for err in &report.errors {
      warn!(error = %err, "artifact staging problem");
    }
    info!(count = report.copied.len(), "artifacts staged");
    result.artifacts = report.copied;
    result.artifact_errors = report.errors;
    Ok(result)
  }
}

/// Completes on Ctrl-C. Never completes if the handler cannot be installed.
async fn interrupted() {
  if tokio::signal::ctrl_c().await.is_err() {
    std::future::pending::<()>().await;
  }
}
