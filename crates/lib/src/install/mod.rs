//! Wheel installation.
//!
//! The delegate here computes the install scheme and hands the actual file
//! placement to the placement component in [`place`]. Launcher generation,
//! shebang rewriting, and record keeping are the responsibility of richer
//! installers; the interpreter path is accepted and passed through untouched.

mod place;

use std::io;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use tracing::info;

use crate::build::{BuildError, BuildRequest, Frontend};
use crate::scheme::InstallScheme;

/// Errors that can occur while installing a wheel.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
  #[error("cannot derive a distribution name from wheel '{wheel}'")]
  BadWheelName { wheel: String },

  #[error("wheel archive error: {0}")]
  Archive(#[from] zip::result::ZipError),

  #[error("wheel entry '{entry}': {reason}")]
  BadEntry { entry: String, reason: String },

  #[error("cannot access '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("cannot compile '{path}': {source}")]
  Compile {
    path: String,
    #[source]
    source: LuaError,
  },

  #[error(transparent)]
  Build(#[from] BuildError),
}

/// Script launcher flavor of the target platform; passed through to the
/// placement component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherKind {
  Posix,
  Windows,
}

impl LauncherKind {
  /// The launcher kind for the platform this process runs on.
  pub fn detect() -> Self {
    if cfg!(windows) { Self::Windows } else { Self::Posix }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Posix => "posix",
      Self::Windows => "windows",
    }
  }
}

/// How and where to install.
#[derive(Debug, Clone)]
pub struct InstallOptions {
  /// Staging directory prepended to every installed path.
  pub destdir: PathBuf,
  /// Installation prefix the scheme is derived from.
  pub prefix: PathBuf,
  /// Interpreter recorded for script launchers; passed through only.
  pub interpreter: PathBuf,
  /// Launcher flavor for installed scripts; passed through only.
  pub launcher: LauncherKind,
  /// Bytecode optimization levels to compile installed sources for.
  pub optimization_levels: Vec<u8>,
}

/// Summary of one installation.
#[derive(Debug)]
pub struct InstallReport {
  /// The scheme the wheel was installed under.
  pub scheme: InstallScheme,
  /// Number of files placed from the wheel.
  pub files: usize,
  /// Number of bytecode caches written.
  pub bytecode_files: usize,
}

/// Install a built wheel into the staging root.
pub fn install_wheel(wheel: &Path, options: &InstallOptions) -> Result<InstallReport, InstallError> {
  let dist_name = dist_name_from_wheel(wheel)?;
  let scheme = InstallScheme::from_prefix(&options.prefix, &dist_name);

  info!(
    wheel = %wheel.display(),
    destdir = %options.destdir.display(),
    interpreter = %options.interpreter.display(),
    launcher = options.launcher.as_str(),
    "installing wheel"
  );
  let report = place::place_archive(wheel, &scheme, options)?;
  info!(
    files = report.files,
    bytecode = report.bytecode_files,
    "installation complete"
  );
  Ok(report)
}

/// Build a wheel into a temporary directory, install it, and discard it.
///
/// The request's `output_dir` is replaced with the temporary directory; any
/// value the caller set there is ignored.
pub fn install_from_source(
  frontend: &Frontend,
  request: BuildRequest,
  options: &InstallOptions,
) -> Result<InstallReport, InstallError> {
  let temp = tempfile::tempdir().map_err(|source| InstallError::Io {
    path: std::env::temp_dir().display().to_string(),
    source,
  })?;

  let mut request = request;
  request.output_dir = temp.path().to_path_buf();

  let wheel_name = frontend.build_wheel(&request)?;
  install_wheel(&temp.path().join(wheel_name), options)
}

/// The distribution name is the wheel filename up to the first `-`.
fn dist_name_from_wheel(wheel: &Path) -> Result<String, InstallError> {
  let bad_name = || InstallError::BadWheelName {
    wheel: wheel.display().to_string(),
  };

  let stem = wheel.file_stem().and_then(|s| s.to_str()).ok_or_else(bad_name)?;
  let name = stem.split('-').next().unwrap_or_default();
  if name.is_empty() {
    return Err(bad_name());
  }
  Ok(name.to_string())
}
