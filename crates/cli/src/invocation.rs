//! Sorting free-form positional arguments into project, target and tool.
//!
//! `uvbuild` accepts `[project-file] [target-name]` in any order. An argument
//! ending in a project extension is the project, one naming `UV4.exe` is the
//! build tool, and anything else is the target.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use uvbuild_lib::project::has_project_extension;

/// Characters that cannot appear in a µVision target name.
const INVALID_TARGET_CHARS: &[char] = &['<', '>', ':', '|', '/', '\\', '"', '*', '?'];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Invocation {
  pub project: Option<PathBuf>,
  pub target: Option<String>,
  pub uv4: Option<PathBuf>,
}

fn names_uv4(arg: &str) -> bool {
  Path::new(arg)
    .file_name()
    .and_then(|n| n.to_str())
    .is_some_and(|n| n.eq_ignore_ascii_case("UV4.exe"))
}

pub fn classify(args: &[String]) -> Result<Invocation> {
  let mut inv = Invocation::default();

  for arg in args {
    if has_project_extension(Path::new(arg)) {
      if inv.project.is_some() {
        bail!("more than one project file given: {}", arg);
      }
      inv.project = Some(PathBuf::from(arg));
    } else if names_uv4(arg) {
      inv.uv4 = Some(PathBuf::from(arg));
    } else {
      if arg.contains(INVALID_TARGET_CHARS) {
        bail!("invalid target name '{}' (not a .uvprojx/.uvproj file either)", arg);
      }
      if inv.target.is_some() {
        bail!("more than one target given: {}", arg);
      }
      inv.target = Some(arg.clone());
    }
  }

  Ok(inv)
}
