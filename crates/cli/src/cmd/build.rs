//! Implementation of the `uvbuild` build command.
//!
//! Resolves the project and UV4, runs the build with its output relayed live,
//! then reports diagnostics and staged artifacts.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::debug;

use uvbuild_lib::build::BuildCommand;
use uvbuild_lib::consts::UV4_ENV;
use uvbuild_lib::diagnostics::Severity;
use uvbuild_lib::{BuildError, BuildOutcome, BuildRequest, BuildResult, Config, ProjectError, Runner};

use crate::invocation::Invocation;
use crate::output::{
  format_bytes, format_duration, print_diagnostic, print_error, print_info, print_rule, print_stat, print_success,
  print_warning, symbols,
};

/// Process exit codes.
pub mod exit {
  /// No project, ambiguous project, or bad configuration.
  pub const CONFIG: u8 = 2;
  /// UV4 could not be started.
  pub const LAUNCH: u8 = 3;
  /// Failure with no usable tool exit code.
  pub const BUILD_FAILED: u8 = 1;
  pub const TIMEOUT: u8 = 124;
  pub const INTERRUPTED: u8 = 130;
}

/// Options for a build invocation.
pub struct BuildOptions {
  pub invocation: Invocation,
  pub jobs: Option<u32>,
  /// `--uv4`, which wins over a positional UV4 path.
  pub uv4: Option<PathBuf>,
  pub verbose: bool,
}

/// Execute the build command.
///
/// Returns the process exit code: `0` on success, the tool's own code when
/// it failed, and the codes in [`exit`] for everything else.
pub fn cmd_build(options: BuildOptions) -> Result<ExitCode> {
  let workdir = std::env::current_dir().context("Failed to determine working directory")?;

  let config = match Config::load(&workdir) {
    Ok(config) => config,
    Err(e) => {
      print_error(&e.to_string());
      return Ok(ExitCode::from(exit::CONFIG));
    }
  };

  let mut runner = match Runner::new(&workdir, config) {
    Ok(runner) => runner,
    Err(e) => {
      print_error(&e.to_string());
      return Ok(ExitCode::from(exit::CONFIG));
    }
  };
  if let Some(uv4) = options.uv4.as_ref().or(options.invocation.uv4.as_ref()) {
    runner = runner.with_uv4(uv4);
  }

  let project = match runner.locate_project(options.invocation.project.as_deref()) {
    Ok(project) => project,
    Err(e) => {
      report_project_error(&e);
      return Ok(ExitCode::from(exit::CONFIG));
    }
  };

  let request = BuildRequest::new(project)
    .with_target(options.invocation.target)
    .with_jobs(options.jobs);

  print_header(&runner, &request, options.verbose);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = match rt.block_on(runner.run(&request)) {
    Ok(result) => result,
    Err(e @ BuildError::Launch { .. }) => {
      print_error(&e.to_string());
      print_info(&format!("Point {} or --uv4 at UV4.exe", UV4_ENV));
      return Ok(ExitCode::from(exit::LAUNCH));
    }
    Err(e) => return Err(e).context("Build supervision failed"),
  };

  print_rule();
  Ok(report(&result))
}

fn report_project_error(err: &ProjectError) {
  print_error(&err.to_string());
  if let ProjectError::Ambiguous { candidates, .. } = err {
    for candidate in candidates {
      print_diagnostic(&candidate.display().to_string(), true);
    }
  }
}

fn print_header(runner: &Runner, request: &BuildRequest, verbose: bool) {
  let project_name = request
    .project
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| request.project.display().to_string());

  print_info(&format!("Building {}", project_name.bold()));
  print_stat("Project", &request.project.display().to_string());
  print_stat(
    "UV4",
    &format!("{} ({})", runner.uv4().path.display(), runner.uv4().source),
  );
  if let Some(target) = &request.target {
    print_stat("Target", target);
  }
  match request.jobs {
    Some(0) => print_stat("Jobs", "-j0 (all cores)"),
    Some(n) => print_stat("Jobs", &format!("-j{}", n)),
    None => {}
  }
  print_stat("Time", &humantime::format_rfc3339_seconds(SystemTime::now()).to_string());

  if verbose {
    let tool_output = runner.config().tool_output.as_ref().map(|p| runner.workdir().join(p));
    let command = BuildCommand::new(&runner.uv4().path, request, tool_output.as_deref());
    print_stat("Command", &command.display());
    print_stat("Log", &runner.log_path().display().to_string());
  }
  debug!(project = %request.project.display(), "build request ready");
  print_rule();
}

fn report(result: &BuildResult) -> ExitCode {
  let elapsed = format_duration(result.duration);
  let warnings: Vec<_> = result.warnings().collect();
  let errors: Vec<_> = result.errors().collect();

  match result.outcome {
    BuildOutcome::Succeeded => {
      if warnings.is_empty() {
        print_success(&format!("Build succeeded in {}", elapsed));
      } else {
        print_success(&format!(
          "Build succeeded in {} with {} warning(s)",
          elapsed,
          warnings.len()
        ));
        for w in &warnings {
          print_diagnostic(&w.line, false);
        }
      }
      report_artifacts(result);
      ExitCode::SUCCESS
    }
    BuildOutcome::Failed => {
      let code = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
      print_error(&format!(
        "Build failed after {} (exit code {}, {} error(s), {} warning(s))",
        elapsed,
        code,
        errors.len(),
        warnings.len()
      ));
      for d in &result.diagnostics {
        print_diagnostic(&d.line, d.severity == Severity::Error);
      }
      ExitCode::from(failure_code(result.exit_code))
    }
    BuildOutcome::Interrupted => {
      print_warning(&format!("Build interrupted after {}", elapsed));
      ExitCode::from(exit::INTERRUPTED)
    }
    BuildOutcome::TimedOut => {
      print_error(&format!("Build timed out after {}", elapsed));
      ExitCode::from(exit::TIMEOUT)
    }
  }
}

fn report_artifacts(result: &BuildResult) {
  if !result.artifacts.is_empty() {
    print_info("Output files:");
    for path in &result.artifacts {
      let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
      let size = std::fs::metadata(path).map(|m| format_bytes(m.len())).unwrap_or_default();
      println!(
        "  {} {} {}",
        symbols::SUCCESS.green(),
        name,
        format!("({})", size).dimmed()
      );
    }
  }
  for err in &result.artifact_errors {
    print_warning(&err.to_string());
  }
}

/// Mirror the tool's exit code where it fits in a process exit status.
fn failure_code(code: Option<i32>) -> u8 {
  match code {
    Some(c) if (1..=255).contains(&c) => c as u8,
    _ => exit::BUILD_FAILED,
  }
}
