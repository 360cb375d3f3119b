use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cmd;
mod invocation;
mod output;

use cmd::BuildOptions;

/// uvbuild - run Keil µVision builds from the command line
#[derive(Parser)]
#[command(name = "uvbuild")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    uvbuild                          Auto-detect the project in this directory
    uvbuild -j4                      Build with 4 parallel jobs
    uvbuild blinky.uvprojx           Build a specific project
    uvbuild -j2 blinky.uvprojx Debug Build target 'Debug'

ENVIRONMENT:
    UVBUILD_UV4       Path to UV4.exe
    UVBUILD_CONFIG    Path to a uvbuild.json policy file
    RUST_LOG=debug    Enable debug logging")]
struct Cli {
  /// Project file (.uvprojx/.uvproj) and/or target name, in any order.
  /// The project is auto-detected in the current directory when omitted.
  #[arg(value_name = "PROJECT|TARGET", num_args = 0..=3)]
  args: Vec<String>,

  /// Parallel jobs for UV4 (0 uses all cores)
  #[arg(short = 'j', value_name = "N")]
  jobs: Option<u32>,

  /// Path to UV4.exe
  #[arg(long, value_name = "PATH")]
  uv4: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,
}

/// Accept the Windows-style `/?` as a help flag.
fn normalize_args(args: impl Iterator<Item = OsString>) -> Vec<OsString> {
  args
    .map(|arg| if arg == "/?" { OsString::from("--help") } else { arg })
    .collect()
}

fn main() -> ExitCode {
  let cli = Cli::parse_from(normalize_args(std::env::args_os()));

  // Initialize logging; RUST_LOG takes precedence over --verbose
  let default_filter = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let invocation = match invocation::classify(&cli.args) {
    Ok(invocation) => invocation,
    Err(e) => {
      output::print_error(&e.to_string());
      return ExitCode::from(cmd::exit::CONFIG);
    }
  };

  let options = BuildOptions {
    invocation,
    jobs: cli.jobs,
    uv4: cli.uv4,
    verbose: cli.verbose,
  };

  match cmd::cmd_build(options) {
    Ok(code) => code,
    Err(e) => {
      output::print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slash_question_mark_means_help() {
    let args = normalize_args(["uvbuild", "/?"].into_iter().map(OsString::from));
    assert_eq!(args, vec![OsString::from("uvbuild"), OsString::from("--help")]);
  }

  #[test]
  fn attached_job_count_parses() {
    let cli = Cli::try_parse_from(["uvbuild", "-j4", "blinky.uvprojx", "Debug"]).unwrap();
    assert_eq!(cli.jobs, Some(4));
    assert_eq!(cli.args, vec!["blinky.uvprojx", "Debug"]);
  }

  #[test]
  fn invalid_job_count_is_rejected() {
    assert!(Cli::try_parse_from(["uvbuild", "-jx"]).is_err());
  }
}
