//! Classification of build output lines.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::{Config, ConfigError};

/// Matches µVision's closing line, e.g.
/// `".\Objects\blinky.axf" - 0 Error(s), 2 Warning(s).`
static SUMMARY_LINE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#""([^"]+)"\s*-\s*(\d+)\s*Error\(s\),\s*(\d+)\s*Warning\(s\)"#).expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
  Warning,
  Error,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Severity::Warning => f.write_str("warning"),
      Severity::Error => f.write_str("error"),
    }
  }
}

/// A warning or error line captured from the build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub severity: Severity,
  pub line: String,
}

/// The tool's summary line: linked image plus error/warning counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
  /// Image path as printed, with `/` separators.
  pub image: PathBuf,
  pub errors: u32,
  pub warnings: u32,
}

impl BuildSummary {
  /// Parse a summary line, if this is one.
  pub fn parse(line: &str) -> Option<Self> {
    let caps = SUMMARY_LINE.captures(line)?;
    Some(Self {
      image: PathBuf::from(caps[1].replace('\\', "/")),
      errors: caps[2].parse().ok()?,
      warnings: caps[3].parse().ok()?,
    })
  }
}

/// Compiled fatal and warning patterns.
#[derive(Debug, Clone)]
pub struct DiagnosticMatcher {
  fatal: Vec<Regex>,
  warning: Vec<Regex>,
}

impl DiagnosticMatcher {
  pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
    Ok(Self {
      fatal: compile("fatal", &config.fatal_patterns)?,
      warning: compile("warning", &config.warning_patterns)?,
    })
  }

  /// Classify one line. Fatal patterns take precedence.
  pub fn classify(&self, line: &str) -> Option<Severity> {
    if self.fatal.iter().any(|re| re.is_match(line)) {
      Some(Severity::Error)
    } else if self.warning.iter().any(|re| re.is_match(line)) {
      Some(Severity::Warning)
    } else {
      None
    }
  }
}

fn compile(field: &'static str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
  patterns
    .iter()
    .map(|p| {
      Regex::new(p).map_err(|e| ConfigError::Pattern {
        field,
        pattern: p.clone(),
        source: e,
      })
    })
    .collect()
}
