//! Supervised UV4 builds.
//!
//! This module launches UV4 and relays its output line by line to the
//! console and the build log. It decides the outcome from the exit code and
//! the lines it saw. The flow:
//! 1. Truncate the listing file and spawn UV4 with piped stdout/stderr
//! 2. Drain both pipes and the listing concurrently into one channel
//! 3. Echo, log and classify each line as it arrives
//! 4. Stop on child exit, cancellation or timeout
//! 5. Judge success: accepted exit code and no fatal line

mod command;
mod log;
mod stream;
pub mod types;

use std::future::Future;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant, SystemTime};

use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diagnostics::{BuildSummary, Diagnostic, DiagnosticMatcher, Severity};

pub use command::BuildCommand;
pub use log::LogSink;
pub use stream::{OutputLine, Stream};
pub use types::{BuildError, BuildOutcome, BuildRequest, BuildResult};

/// Lines buffered between the readers and the supervisor.
const LINE_CHANNEL_CAPACITY: usize = 256;

/// How long output may keep arriving after UV4 exits. Anything still holding
/// the pipes after that (a backgrounded helper, say) is cut loose.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Margin for file systems with coarse timestamps (FAT keeps 2 s).
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Everything a build needs besides the request.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
  pub uv4: &'a Path,
  pub workdir: &'a Path,
  pub config: &'a Config,
  pub matcher: &'a DiagnosticMatcher,
  /// Relay lines to the console.
  pub echo: bool,
}

/// Running tally of what the output said.
#[derive(Debug, Default)]
struct OutputScan {
  lines: usize,
  diagnostics: Vec<Diagnostic>,
  summary: Option<BuildSummary>,
}

impl OutputScan {
  fn record(&mut self, matcher: &DiagnosticMatcher, line: &str) {
    self.lines += 1;
    if let Some(severity) = matcher.classify(line) {
      self.diagnostics.push(Diagnostic {
        severity,
        line: line.to_string(),
      });
    }
    if let Some(summary) = BuildSummary::parse(line) {
      self.summary = Some(summary);
    }
  }

  fn saw_fatal(&self) -> bool {
    self.diagnostics.iter().any(|d| d.severity == Severity::Error)
  }
}

fn echo_line(line: &OutputLine) {
  match line.stream {
    Stream::Stderr => eprintln!("{}", line.text),
    Stream::Stdout | Stream::Listing => println!("{}", line.text),
  }
}

fn relay(ctx: &BuildContext<'_>, log: &mut LogSink, scan: &mut OutputScan, line: &OutputLine) {
  if ctx.echo {
    echo_line(line);
  }
  log.write_line(&line.text);
  scan.record(ctx.matcher, &line.text);
}

/// Empty the listing file and return the build's start time.
///
/// The time is read back from the file system, since artifact mtimes are
/// stamped by the same clock. Without a listing file the system clock is
/// used, less [`MTIME_SLACK`].
fn reset_listing(path: Option<&Path>) -> SystemTime {
  let fallback = || SystemTime::now().checked_sub(MTIME_SLACK).unwrap_or(SystemTime::UNIX_EPOCH);
  let Some(path) = path else {
    return fallback();
  };
  // Stale listing content would be replayed as this build's output.
  if let Err(e) = std::fs::write(path, b"") {
    warn!(path = %path.display(), error = %e, "cannot reset tool output file");
    return fallback();
  }
  std::fs::metadata(path)
    .and_then(|m| m.modified())
    .unwrap_or_else(|_| fallback())
}

/// Run one build under supervision.
///
/// `cancel` is polled alongside the child; when it completes the child is
/// killed and the result is [`BuildOutcome::Interrupted`]. Artifacts are not
/// collected here.
///
/// # Errors
///
/// Returns [`BuildError::Launch`] if UV4 cannot be spawned. Everything that
/// happens after a successful spawn is reported through the result instead.
pub async fn execute<F>(request: &BuildRequest, ctx: &BuildContext<'_>, cancel: F) -> Result<BuildResult, BuildError>
where
  F: Future<Output = ()>,
{
  let clock = Instant::now();
  let tool_output = ctx.config.tool_output.as_ref().map(|p| ctx.workdir.join(p));
  let started_at = reset_listing(tool_output.as_deref());

  let command = BuildCommand::new(ctx.uv4, request, tool_output.as_deref());
  info!(command = %command.display(), "launching build");

  let mut child = Command::new(&command.program)
    .args(&command.args)
    .current_dir(ctx.workdir)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .spawn()
    .map_err(|e| BuildError::Launch {
      program: command.program.clone(),
      source: e,
    })?;
  debug!(pid = ?child.id(), "build started");

  let (tx, mut rx) = mpsc::channel::<OutputLine>(LINE_CHANNEL_CAPACITY);
  let mut producers = Vec::new();
  if let Some(out) = child.stdout.take() {
    producers.push(stream::spawn_pipe_reader(out, Stream::Stdout, tx.clone()));
  }
  if let Some(err) = child.stderr.take() {
    producers.push(stream::spawn_pipe_reader(err, Stream::Stderr, tx.clone()));
  }
  let mut stop_listing: Option<oneshot::Sender<()>> = None;
  if let Some(path) = tool_output {
    let (stop_tx, stop_rx) = oneshot::channel();
    producers.push(stream::spawn_listing_follower(path, tx.clone(), stop_rx));
    stop_listing = Some(stop_tx);
  }
  drop(tx);

  let mut log = LogSink::open(&ctx.workdir.join(&ctx.config.log_file));
  let mut scan = OutputScan::default();

  let timeout = ctx.config.timeout();
  let deadline = async move {
    match timeout {
      Some(limit) => tokio::time::sleep(limit).await,
      None => std::future::pending::<()>().await,
    }
  };
  // Armed once the child exits.
  let drain = tokio::time::sleep(Duration::ZERO);
  tokio::pin!(cancel);
  tokio::pin!(deadline);
  tokio::pin!(drain);

  let mut status: Option<ExitStatus> = None;
  let mut aborted: Option<BuildOutcome> = None;

  loop {
    tokio::select! {
      line = rx.recv() => match line {
        Some(line) => relay(ctx, &mut log, &mut scan, &line),
        // Every producer is done: both pipes hit EOF and the listing was flushed.
        None => break,
      },
      exit = child.wait(), if status.is_none() => {
        let exit = exit?;
        debug!(code = ?exit.code(), "build process exited");
        status = Some(exit);
        if let Some(stop) = stop_listing.take() {
          let _ = stop.send(());
        }
        drain.as_mut().reset(tokio::time::Instant::now() + EXIT_DRAIN_GRACE);
      }
      _ = &mut drain, if status.is_some() => {
        debug!("output still open after exit, detaching readers");
        while let Ok(line) = rx.try_recv() {
          relay(ctx, &mut log, &mut scan, &line);
        }
        break;
      }
      _ = &mut cancel => {
        aborted = Some(BuildOutcome::Interrupted);
        break;
      }
      _ = &mut deadline, if status.is_none() => {
        aborted = Some(BuildOutcome::TimedOut);
        break;
      }
    }
  }

  let status = match (aborted, status) {
    (Some(outcome), _) => {
      warn!(%outcome, "stopping build");
      // The child may already be gone; a failed kill is fine as long as it is reaped.
      if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed");
      }
      child.wait().await.ok()
    }
    (None, Some(status)) => Some(status),
    (None, None) => Some(child.wait().await?),
  };
  drop(rx);
  for producer in &producers {
    producer.abort();
  }
  log.close();

  let exit_code = status.and_then(|s| s.code());
  let outcome = match aborted {
    Some(outcome) => outcome,
    None => {
      let accepted = exit_code.is_some_and(|code| ctx.config.success_exit_codes.contains(&code));
      if accepted && !scan.saw_fatal() {
        BuildOutcome::Succeeded
      } else {
        BuildOutcome::Failed
      }
    }
  };

  info!(%outcome, exit_code = ?exit_code, lines = scan.lines, "build finished");

  Ok(BuildResult {
    outcome,
    exit_code,
    diagnostics: scan.diagnostics,
    summary: scan.summary,
    lines: scan.lines,
    started_at,
    duration: clock.elapsed(),
    artifacts: Vec::new(),
    artifact_errors: Vec::new(),
  })
}
