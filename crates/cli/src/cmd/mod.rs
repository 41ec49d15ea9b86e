//! Subcommand implementations.
//!
//! Each command returns the process exit code. Frontend failures carry
//! distinct codes so callers can tell configuration problems from backend
//! failures: 2 for configuration, 3 for backend resolution, 4 for a backend
//! that raised, 1 for everything else.

mod backend;
mod build;
mod install;
mod verify;

use std::fmt;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use wheelwright_lib::backend::ConfigError;
use wheelwright_lib::build::BuildError;
use wheelwright_lib::consts;
use wheelwright_lib::install::{InstallError, InstallOptions, LauncherKind};
use wheelwright_lib::manifest::ManifestError;

pub use backend::cmd_get_backend;
pub use build::cmd_build;
pub use install::{cmd_install_from_source, cmd_install_wheel};
pub use verify::cmd_verify_bytecode;

/// Build-related flags shared by `build` and `install-from-source`.
#[derive(Debug, clap::Args)]
pub struct BuildArgs {
  /// Backend to use instead of the manifest declaration
  #[arg(long)]
  pub backend: Option<String>,

  /// Backend to use when the manifest declares none
  #[arg(long, default_value = consts::FALLBACK_BACKEND_MODULE)]
  pub fallback_backend: String,

  /// Fail instead of falling back when the manifest declares no backend
  #[arg(long)]
  pub no_fallback_backend: bool,

  /// Path to the project manifest
  #[arg(long, default_value = consts::DEFAULT_MANIFEST)]
  pub project_toml: PathBuf,

  /// Permit the backend to write compressed wheel entries
  #[arg(long)]
  pub allow_compressed: bool,

  /// JSON dictionary of config settings to pass to the backend
  #[arg(long, value_parser = parse_config_json)]
  pub config_json: Option<serde_json::Value>,
}

/// Install-related flags shared by `install-wheel` and `install-from-source`.
#[derive(Debug, clap::Args)]
pub struct InstallArgs {
  /// Staging directory prepended to all install paths
  #[arg(long)]
  pub destdir: PathBuf,

  /// Prefix to install under
  #[arg(long, default_value = consts::DEFAULT_PREFIX)]
  pub prefix: PathBuf,

  /// Interpreter recorded for installed scripts
  #[arg(long, default_value = "lua")]
  pub interpreter: PathBuf,

  /// Comma-separated optimization levels to compile bytecode for, or "all"
  #[arg(long, value_parser = parse_optimize)]
  pub optimize: Option<OptimizeLevels>,
}

impl InstallArgs {
  pub fn to_options(&self) -> InstallOptions {
    InstallOptions {
      destdir: self.destdir.clone(),
      prefix: self.prefix.clone(),
      interpreter: self.interpreter.clone(),
      launcher: LauncherKind::detect(),
      optimization_levels: self.optimize.clone().unwrap_or_default().0,
    }
  }
}

/// Parsed `--optimize` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeLevels(pub Vec<u8>);

/// Parse a comma-separated level list; `all` expands to every known level.
pub fn parse_optimize(value: &str) -> Result<OptimizeLevels, String> {
  let mut levels = Vec::new();
  for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
    if part == "all" {
      levels.extend(consts::ALL_OPT_LEVELS);
    } else {
      levels.push(
        part
          .parse::<u8>()
          .map_err(|_| format!("invalid optimization level '{part}'"))?,
      );
    }
  }
  levels.sort_unstable();
  levels.dedup();
  Ok(OptimizeLevels(levels))
}

fn parse_config_json(value: &str) -> Result<serde_json::Value, String> {
  serde_json::from_str(value).map_err(|err| err.to_string())
}

/// Any failure on the build or install path, kept as typed values so each
/// kind can map to its exit code. Not routed through anyhow because backend
/// errors hold Lua state references and are not Send + Sync.
pub(crate) enum FrontendError {
  Manifest(ManifestError),
  Config(ConfigError),
  Build(BuildError),
  Install(InstallError),
}

impl FrontendError {
  pub(crate) fn exit_code(&self) -> i32 {
    match self {
      Self::Manifest(_) => 1,
      Self::Config(_) => 2,
      Self::Build(err) => build_exit_code(err),
      Self::Install(InstallError::Build(err)) => build_exit_code(err),
      Self::Install(_) => 1,
    }
  }
}

fn build_exit_code(err: &BuildError) -> i32 {
  match err {
    BuildError::Resolution(_) => 3,
    BuildError::Backend(_) => 4,
    _ => 1,
  }
}

impl fmt::Display for FrontendError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Manifest(err) => err.fmt(f),
      Self::Config(err) => err.fmt(f),
      Self::Build(err) => err.fmt(f),
      Self::Install(err) => err.fmt(f),
    }
  }
}

impl From<ManifestError> for FrontendError {
  fn from(err: ManifestError) -> Self {
    Self::Manifest(err)
  }
}

impl From<ConfigError> for FrontendError {
  fn from(err: ConfigError) -> Self {
    Self::Config(err)
  }
}

impl From<BuildError> for FrontendError {
  fn from(err: BuildError) -> Self {
    Self::Build(err)
  }
}

impl From<InstallError> for FrontendError {
  fn from(err: InstallError) -> Self {
    Self::Install(err)
  }
}

/// Report a frontend failure and return its exit code.
pub(crate) fn fail(err: FrontendError) -> i32 {
  eprintln!("{} {}", "error:".red().bold(), err);
  err.exit_code()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn optimize_accepts_lists_and_all() {
    assert_eq!(parse_optimize("0").unwrap().0, vec![0]);
    assert_eq!(parse_optimize("2,0").unwrap().0, vec![0, 2]);
    assert_eq!(parse_optimize("all").unwrap().0, vec![0, 1, 2]);
    assert_eq!(parse_optimize("all,1").unwrap().0, vec![0, 1, 2]);
    assert_eq!(parse_optimize("").unwrap().0, Vec::<u8>::new());
  }

  #[test]
  fn optimize_rejects_garbage() {
    assert!(parse_optimize("fast").is_err());
    assert!(parse_optimize("-1").is_err());
  }

  #[test]
  fn config_errors_are_distinct_from_backend_errors() {
    let config = FrontendError::Config(ConfigError::NoBackend);
    assert_eq!(config.exit_code(), 2);

    let manifest = FrontendError::Manifest(ManifestError::Io {
      path: "project.toml".to_string(),
      source: std::io::Error::other("denied"),
    });
    assert_eq!(manifest.exit_code(), 1);
  }
}
