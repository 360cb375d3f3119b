//! uvbuild-lib: supervised Keil µVision command-line builds
//!
//! This crate provides the pieces behind the `uvbuild` command:
//! - `project`: locating and scanning `.uvprojx`/`.uvproj` files
//! - `toolchain`: finding the `UV4.exe` build executable
//! - `build`: running UV4 and relaying its output to the console and a log
//! - `artifacts`: staging freshly built `.hex`/`.bin` images
//! - `runner`: the `Runner` tying these together

pub mod artifacts;
pub mod build;
pub mod config;
pub mod consts;
pub mod diagnostics;
pub mod project;
pub mod runner;
pub mod toolchain;

#[cfg(test)]
mod util;

pub use build::{BuildError, BuildOutcome, BuildRequest, BuildResult};
pub use config::{Config, ConfigError};
pub use project::ProjectError;
pub use runner::Runner;
