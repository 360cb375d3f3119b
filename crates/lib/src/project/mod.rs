//! Project file discovery.
//!
//! A µVision project is a single `.uvprojx` (or legacy `.uvproj`) file. When
//! no path is given on the command line, the working directory is searched for
//! exactly one of them.

mod file;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::PROJECT_EXTENSIONS;

pub use file::{ProjectFile, TargetInfo};

/// Errors that can occur while locating or reading a project file.
#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("no Keil project (.uvprojx/.uvproj) found in {}", dir.display())]
  NotFound { dir: PathBuf },

  #[error("multiple Keil projects found in {}: {}; pass one explicitly", dir.display(), format_candidates(candidates))]
  Ambiguous { dir: PathBuf, candidates: Vec<PathBuf> },

  #[error("project not found: {}", path.display())]
  Missing { path: PathBuf },

  #[error("failed to read {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },
}

fn format_candidates(candidates: &[PathBuf]) -> String {
  candidates
    .iter()
    .map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Returns true if the path ends in one of the known project extensions.
///
/// The comparison ignores case, since Windows file names are case-insensitive.
pub fn has_project_extension(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| PROJECT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Resolve the project file to build.
///
/// An explicit path is resolved against `dir` and must exist. Without one,
/// `dir` (not its subdirectories) must contain exactly one project file.
pub fn locate_project(dir: &Path, explicit: Option<&Path>) -> Result<PathBuf, ProjectError> {
  if let Some(path) = explicit {
    let path = if path.is_absolute() { path.to_path_buf() } else { dir.join(path) };
    if !path.is_file() {
      return Err(ProjectError::Missing { path });
    }
    return Ok(path);
  }

  let entries = fs::read_dir(dir).map_err(|e| ProjectError::Read {
    path: dir.to_path_buf(),
    source: e,
  })?;

  let mut candidates: Vec<PathBuf> = entries
    .flatten()
    .map(|entry| entry.path())
    .filter(|path| path.is_file() && has_project_extension(path))
    .collect();
  candidates.sort();

  debug!(dir = %dir.display(), count = candidates.len(), "project candidates");

  match candidates.len() {
    0 => Err(ProjectError::NotFound { dir: dir.to_path_buf() }),
    1 => Ok(candidates.remove(0)),
    _ => Err(ProjectError::Ambiguous {
      dir: dir.to_path_buf(),
      candidates,
    }),
  }
}
