//! Staging build artifacts into the working directory.
//!
//! After a successful build, fresh `.hex`/`.bin` images are picked up from
//! the project's output directories and copied next to the user. "Fresh"
//! means modified at or after the build started. When the target declares an
//! `<OutputName>`, only images of that name are taken, which keeps other
//! targets' images out of a shared directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diagnostics::BuildSummary;
use crate::project::ProjectFile;

/// Problems while staging artifacts. Reported as warnings only.
#[derive(Debug, Error)]
pub enum ArtifactError {
  #[error("no output directory found for {}", project.display())]
  NoOutputDir { project: PathBuf },

  #[error("no fresh artifacts in {}", format_dirs(searched))]
  NoneFound { searched: Vec<PathBuf> },

  #[error("failed to scan {}: {source}", dir.display())]
  Scan { dir: PathBuf, source: std::io::Error },

  #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
  Copy {
    from: PathBuf,
    to: PathBuf,
    source: std::io::Error,
  },
}

fn format_dirs(dirs: &[PathBuf]) -> String {
  dirs.iter().map(|d| d.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// Outcome of staging artifacts.
#[derive(Debug, Default)]
pub struct ArtifactReport {
  /// Directories that were scanned.
  pub searched: Vec<PathBuf>,
  /// Destination paths of the staged artifacts.
  pub copied: Vec<PathBuf>,
  pub errors: Vec<ArtifactError>,
}

/// Where to look for images, and which ones to take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSearch {
  /// Existing output directories, most specific first.
  pub dirs: Vec<PathBuf>,
  /// Image base names to stage. Empty takes any name.
  pub names: Vec<String>,
}

impl ArtifactSearch {
  /// Work out the search for a build of `project`.
  ///
  /// Directory order: the target's `<OutputDirectory>` from the project
  /// file, the directory of the image named in the tool's summary line, then
  /// the conventional directories from config. Only existing directories are
  /// kept, each once.
  ///
  /// Names come from the target's `<OutputName>`, or failing that from the
  /// summary line's image.
  pub fn resolve(project: &Path, target: Option<&str>, summary: Option<&BuildSummary>, config: &Config) -> Self {
    let base = project.parent().unwrap_or(Path::new("."));
    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    match ProjectFile::read(project) {
      Ok(file) => {
        candidates.extend(file.output_dirs(target));
        names = file.output_names(target);
      }
      Err(e) => debug!(error = %e, "project output settings unavailable"),
    }

    if let Some(image) = summary.map(|s| s.image.as_path()) {
      if let Some(dir) = image.parent() {
        candidates.push(if dir.is_absolute() { dir.to_path_buf() } else { base.join(dir) });
      }
      if names.is_empty() {
        names.extend(image.file_stem().map(|s| s.to_string_lossy().into_owned()));
      }
    }

    candidates.extend(config.output_dirs.iter().map(|d| base.join(d)));

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in candidates {
      if !dir.is_dir() {
        continue;
      }
      let dir = dunce::canonicalize(&dir).unwrap_or(dir);
      if !dirs.contains(&dir) {
        dirs.push(dir);
      }
    }

    Self { dirs, names }
  }

  /// Whether `path` carries one of the wanted image names.
  fn wants(&self, path: &Path) -> bool {
    if self.names.is_empty() {
      return true;
    }
    // µVision runs on case-insensitive file systems.
    path
      .file_stem()
      .and_then(|s| s.to_str())
      .is_some_and(|stem| self.names.iter().any(|n| n.eq_ignore_ascii_case(stem)))
  }
}

/// Copy artifacts modified at or after `since` into `dest`.
///
/// Directories are taken in search order and the first image of a given file
/// name wins. Existing files in `dest` are overwritten. A failure on one file
/// is recorded and the rest are still copied.
pub fn collect_artifacts(search: &ArtifactSearch, since: SystemTime, dest: &Path, config: &Config) -> ArtifactReport {
  let mut report = ArtifactReport {
    searched: search.dirs.clone(),
    ..ArtifactReport::default()
  };
  let dest_canonical = dunce::canonicalize(dest).unwrap_or_else(|_| dest.to_path_buf());

  for dir in &search.dirs {
    let entries = match fs::read_dir(dir) {
      Ok(entries) => entries,
      Err(e) => {
        report.errors.push(ArtifactError::Scan {
          dir: dir.clone(),
          source: e,
        });
        continue;
      }
    };

    let mut fresh: Vec<PathBuf> = entries
      .flatten()
      .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
      .map(|entry| entry.path())
      .filter(|path| config.is_artifact(path) && search.wants(path))
      .filter(|path| is_fresh(path, since))
      .collect();
    fresh.sort();

    // Built straight into the working directory; copying onto itself would truncate it.
    let in_place = dunce::canonicalize(dir).is_ok_and(|d| d == dest_canonical);

    for from in fresh {
      let Some(name) = from.file_name() else {
        continue;
      };
      let to = dest.join(name);

      if report.copied.contains(&to) {
        debug!(path = %from.display(), "shadowed by an artifact from a more specific directory");
        continue;
      }

      if in_place {
        debug!(path = %from.display(), "artifact already in place");
        report.copied.push(to);
        continue;
      }

      match fs::copy(&from, &to) {
        Ok(bytes) => {
          info!(from = %from.display(), to = %to.display(), bytes, "staged artifact");
          report.copied.push(to);
        }
        Err(e) => {
          warn!(from = %from.display(), error = %e, "artifact copy failed");
          report.errors.push(ArtifactError::Copy { from, to, source: e });
        }
      }
    }
  }

  report
}

fn is_fresh(path: &Path, since: SystemTime) -> bool {
  fs::metadata(path)
    .and_then(|m| m.modified())
    .is_ok_and(|modified| modified >= since)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::write_aged;
  use std::time::Duration;
  use tempfile::TempDir;

  const HOUR: Duration = Duration::from_secs(3600);

  fn any_name<P: AsRef<Path>>(dirs: &[P]) -> ArtifactSearch {
    ArtifactSearch {
      dirs: dirs.iter().map(|d| d.as_ref().to_path_buf()).collect(),
      names: Vec::new(),
    }
  }

  #[test]
  fn only_fresh_images_are_copied() {
    let temp = TempDir::new().unwrap();
    let objects = temp.path().join("fw").join("Objects");
    let dest = temp.path().join("work");
    fs::create_dir_all(&objects).unwrap();
    fs::create_dir_all(&dest).unwrap();

    let since = SystemTime::now() - Duration::from_secs(60);
    write_aged(&objects, "blinky.hex", b":00000001FF", Duration::ZERO);
    write_aged(&objects, "blinky.bin", b"\x00\x01", Duration::ZERO);
    write_aged(&objects, "stale.hex", b"old", HOUR);
    write_aged(&objects, "blinky.axf", b"elf", Duration::ZERO);

    let report = collect_artifacts(&any_name(&[&objects]), since, &dest, &Config::default());

    assert!(report.errors.is_empty());
    assert_eq!(report.copied, vec![dest.join("blinky.bin"), dest.join("blinky.hex")]);
    assert!(!dest.join("stale.hex").exists());
    assert!(!dest.join("blinky.axf").exists());
    assert_eq!(fs::read(dest.join("blinky.hex")).unwrap(), b":00000001FF");
  }

  #[test]
  fn existing_destination_is_overwritten() {
    let temp = TempDir::new().unwrap();
    let objects = temp.path().join("Objects");
    let dest = temp.path().join("work");
    fs::create_dir_all(&objects).unwrap();
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("app.bin"), b"previous build").unwrap();

    let since = SystemTime::now() - Duration::from_secs(60);
    write_aged(&objects, "app.bin", b"new", Duration::ZERO);

    let report = collect_artifacts(&any_name(&[&objects]), since, &dest, &Config::default());

    assert_eq!(report.copied.len(), 1);
    assert_eq!(fs::read(dest.join("app.bin")).unwrap(), b"new");
  }

  #[test]
  fn artifacts_already_in_destination_are_not_copied_onto_themselves() {
    let temp = TempDir::new().unwrap();
    let since = SystemTime::now() - Duration::from_secs(60);
    write_aged(temp.path(), "app.hex", b"data", Duration::ZERO);

    let report = collect_artifacts(&any_name(&[temp.path()]), since, temp.path(), &Config::default());

    assert_eq!(report.copied, vec![temp.path().join("app.hex")]);
    assert_eq!(fs::read(temp.path().join("app.hex")).unwrap(), b"data");
  }

  #[test]
  fn unreadable_directory_is_reported_per_dir() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("gone");

    let report = collect_artifacts(&any_name(&[&missing]), SystemTime::now(), temp.path(), &Config::default());

    assert!(report.copied.is_empty());
    assert!(matches!(report.errors.as_slice(), [ArtifactError::Scan { .. }]));
  }

  #[test]
  fn only_declared_image_names_are_copied() {
    let temp = TempDir::new().unwrap();
    let objects = temp.path().join("Objects");
    let dest = temp.path().join("work");
    fs::create_dir_all(&objects).unwrap();
    fs::create_dir_all(&dest).unwrap();

    let since = SystemTime::now() - Duration::from_secs(60);
    write_aged(&objects, "Blinky.hex", b"mine", Duration::ZERO);
    write_aged(&objects, "bootloader.hex", b"other target", Duration::ZERO);

    let search = ArtifactSearch {
      dirs: vec![objects],
      names: vec!["blinky".to_string()],
    };
    let report = collect_artifacts(&search, since, &dest, &Config::default());

    assert_eq!(report.copied, vec![dest.join("Blinky.hex")]);
    assert!(!dest.join("bootloader.hex").exists());
  }

  #[test]
  fn most_specific_directory_wins_a_name_clash() {
    let temp = TempDir::new().unwrap();
    let specific = temp.path().join("build").join("dbg");
    let conventional = temp.path().join("Objects");
    let dest = temp.path().join("work");
    for dir in [&specific, &conventional, &dest] {
      fs::create_dir_all(dir).unwrap();
    }

    let since = SystemTime::now() - Duration::from_secs(60);
    write_aged(&specific, "app.hex", b"debug build", Duration::ZERO);
    write_aged(&conventional, "app.hex", b"something else", Duration::ZERO);

    let report = collect_artifacts(&any_name(&[&specific, &conventional]), since, &dest, &Config::default());

    assert!(report.errors.is_empty());
    assert_eq!(report.copied, vec![dest.join("app.hex")]);
    assert_eq!(fs::read(dest.join("app.hex")).unwrap(), b"debug build");
  }

  #[test]
  fn output_dirs_follow_project_then_summary_then_convention() {
    let temp = TempDir::new().unwrap();
    let fw = temp.path().join("fw");
    for dir in ["build/dbg", "lst", "Objects", "Output"] {
      fs::create_dir_all(fw.join(dir)).unwrap();
    }
    let project = fw.join("blinky.uvprojx");
    fs::write(
      &project,
      "<Project><Targets><Target><TargetName>Debug</TargetName>\
       <OutputDirectory>.\\build\\dbg\\</OutputDirectory></Target></Targets></Project>",
    )
    .unwrap();
    let summary = BuildSummary::parse("\".\\lst\\blinky.axf\" - 0 Error(s), 0 Warning(s).").unwrap();

    let search = ArtifactSearch::resolve(&project, Some("Debug"), Some(&summary), &Config::default());

    let fw = dunce::canonicalize(&fw).unwrap();
    assert_eq!(
      search.dirs,
      vec![
        fw.join("build").join("dbg"),
        fw.join("lst"),
        fw.join("Objects"),
        fw.join("Output"),
      ]
    );
    // No <OutputName>, so the summary's image names the artifacts.
    assert_eq!(search.names, vec!["blinky"]);
  }

  #[test]
  fn declared_output_name_beats_summary_image() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("app.uvprojx");
    fs::write(
      &project,
      "<Target><TargetName>T</TargetName><OutputName>firmware</OutputName></Target>",
    )
    .unwrap();
    let summary = BuildSummary::parse("\"./Objects/other.axf\" - 0 Error(s), 0 Warning(s).").unwrap();

    let search = ArtifactSearch::resolve(&project, Some("T"), Some(&summary), &Config::default());

    assert_eq!(search.names, vec!["firmware"]);
  }

  #[test]
  fn output_dirs_are_deduplicated() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("Objects")).unwrap();
    let project = temp.path().join("app.uvprojx");
    fs::write(
      &project,
      "<Target><TargetName>T</TargetName><OutputDirectory>.\\Objects\\</OutputDirectory></Target>",
    )
    .unwrap();

    let search = ArtifactSearch::resolve(&project, None, None, &Config::default());

    assert_eq!(search.dirs, vec![dunce::canonicalize(temp.path().join("Objects")).unwrap()]);
  }
}
