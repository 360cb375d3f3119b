//! Minimal reading of µVision project files.
//!
//! Only the per-target output configuration is of interest, so the XML is
//! scanned for a handful of tags instead of being fully parsed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::ProjectError;

static TARGET_BLOCK: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<Target>(.*?)</Target>").expect("valid regex"));

static TARGET_NAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<TargetName>(.*?)</TargetName>").expect("valid regex"));

static OUTPUT_DIRECTORY: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<OutputDirectory>(.*?)</OutputDirectory>").expect("valid regex"));

static OUTPUT_NAME: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(?s)<OutputName>(.*?)</OutputName>").expect("valid regex"));

/// Output settings of one build target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
  pub name: String,
  /// Output directory as written in the project, with `/` separators.
  pub output_directory: Option<String>,
  /// Image base name, without extension.
  pub output_name: Option<String>,
}

/// The parts of a project file the runner cares about.
#[derive(Debug, Clone)]
pub struct ProjectFile {
  pub path: PathBuf,
  pub targets: Vec<TargetInfo>,
}

impl ProjectFile {
  /// Read and scan a project file from disk.
  pub fn read(path: &Path) -> Result<Self, ProjectError> {
    let bytes = fs::read(path).map_err(|e| ProjectError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    Ok(Self::parse(path, &String::from_utf8_lossy(&bytes)))
  }

  /// Scan project XML that is already in memory.
  pub fn parse(path: &Path, xml: &str) -> Self {
    let targets = TARGET_BLOCK
      .captures_iter(xml)
      .filter_map(|block| {
        let body = block.get(1)?.as_str();
        let name = capture_text(&TARGET_NAME, body)?;
        Some(TargetInfo {
          name,
          output_directory: capture_text(&OUTPUT_DIRECTORY, body).map(|d| d.replace('\\', "/")),
          output_name: capture_text(&OUTPUT_NAME, body),
        })
      })
      .collect();

    Self {
      path: path.to_path_buf(),
      targets,
    }
  }

  /// Look up a target by name.
  pub fn target(&self, name: &str) -> Option<&TargetInfo> {
    self.targets.iter().find(|t| t.name == name)
  }

  /// Absolute output directories for the named target, or for all targets.
  ///
  /// Relative directories are resolved against the directory holding the
  /// project file, which is how µVision interprets them.
  pub fn output_dirs(&self, target: Option<&str>) -> Vec<PathBuf> {
    let base = self.path.parent().unwrap_or(Path::new("."));

    let mut dirs: Vec<PathBuf> = Vec::new();
    for info in self.selected(target) {
      let Some(dir) = info.output_directory.as_deref() else {
        continue;
      };
      let dir = Path::new(dir);
      let resolved = if dir.is_absolute() { dir.to_path_buf() } else { base.join(dir) };
      if !dirs.contains(&resolved) {
        dirs.push(resolved);
      }
    }
    dirs
  }

  /// Declared image names (`<OutputName>`) for the named target, or for all
  /// targets.
  pub fn output_names(&self, target: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in self.selected(target).into_iter().filter_map(|t| t.output_name.clone()) {
      if !names.contains(&name) {
        names.push(name);
      }
    }
    names
  }

  fn selected(&self, target: Option<&str>) -> Vec<&TargetInfo> {
    match target {
      Some(name) => self.target(name).into_iter().collect(),
      None => self.targets.iter().collect(),
    }
  }
}

fn capture_text(re: &Regex, haystack: &str) -> Option<String> {
  let text = re.captures(haystack)?.get(1)?.as_str().trim();
  if text.is_empty() {
    return None;
  }
  Some(unescape_xml(text))
}

fn unescape_xml(text: &str) -> String {
  text
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&quot;", "\"")
    .replace("&apos;", "'")
    .replace("&amp;", "&")
}
