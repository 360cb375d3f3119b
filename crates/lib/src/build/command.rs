//! UV4 command-line construction.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::types::BuildRequest;

/// A fully assembled UV4 invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
  pub program: PathBuf,
  pub args: Vec<OsString>,
}

impl BuildCommand {
  /// Assemble `UV4 [-jN] -r <project> [-t <target>] [-o <tool_output>]`.
  pub fn new(uv4: &Path, request: &BuildRequest, tool_output: Option<&Path>) -> Self {
    let mut args: Vec<OsString> = Vec::new();

    if let Some(jobs) = request.jobs {
      args.push(format!("-j{jobs}").into());
    }

    args.push("-r".into());
    args.push(request.project.clone().into_os_string());

    if let Some(target) = &request.target {
      args.push("-t".into());
      args.push(target.into());
    }

    if let Some(path) = tool_output {
      args.push("-o".into());
      args.push(path.as_os_str().to_owned());
    }

    Self {
      program: uv4.to_path_buf(),
      args,
    }
  }

  /// Render the command for display, quoting arguments that contain spaces.
  pub fn display(&self) -> String {
    std::iter::once(self.program.as_os_str())
      .chain(self.args.iter().map(OsString::as_os_str))
      .map(|arg| {
        let arg = arg.to_string_lossy();
        if arg.contains(' ') {
          format!("\"{arg}\"")
        } else {
          arg.into_owned()
        }
      })
      .collect::<Vec<_>>()
      .join(" ")
  }
}
