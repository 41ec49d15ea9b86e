//! Installation scheme paths.
//!
//! A scheme maps an abstract installation prefix to the concrete directories
//! an installed distribution occupies. The layout follows the conventional
//! Lua filesystem hierarchy for the targeted interpreter version.

use std::path::{Component, Path, PathBuf};

/// Interpreter version the scheme directories are keyed on.
pub const LUA_ABI_VERSION: &str = "5.4";

/// The five concrete directories derived from a prefix and a distribution
/// name. Read-only once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallScheme {
  /// Pure-Lua module directory, on the interpreter's module search path.
  pub purelib: PathBuf,
  /// Native module directory, on the interpreter's C search path.
  pub platlib: PathBuf,
  /// Executable scripts directory.
  pub scripts: PathBuf,
  /// Root for uncategorized data files.
  pub data: PathBuf,
  /// C header directory for this distribution.
  pub headers: PathBuf,
}

impl InstallScheme {
  /// Compute the scheme for a prefix and distribution name.
  pub fn from_prefix(prefix: &Path, dist_name: &str) -> Self {
    Self {
      purelib: prefix.join("share").join("lua").join(LUA_ABI_VERSION),
      platlib: prefix.join("lib").join("lua").join(LUA_ABI_VERSION),
      scripts: prefix.join("bin"),
      data: prefix.to_path_buf(),
      headers: prefix.join("include").join(dist_name),
    }
  }

  /// The directories that hold installed modules, in scan order.
  pub fn library_dirs(&self) -> [&Path; 2] {
    [&self.purelib, &self.platlib]
  }

  /// Map a wheel entry category to its scheme directory.
  pub fn dir_for_category(&self, category: &str) -> Option<&Path> {
    match category {
      "purelib" => Some(&self.purelib),
      "platlib" => Some(&self.platlib),
      "scripts" => Some(&self.scripts),
      "data" => Some(&self.data),
      "headers" => Some(&self.headers),
      _ => None,
    }
  }
}

/// Re-root an absolute path under a staging directory.
///
/// `staged_path("/stage", "/usr/local/bin/x")` is `/stage/usr/local/bin/x`.
pub fn staged_path(destdir: &Path, absolute: &Path) -> PathBuf {
  let relative: PathBuf = absolute
    .components()
    .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
    .collect();
  destdir.join(relative)
}
