//! Project manifest loading.
//!
//! The manifest (`project.toml` by convention) is the declarative file naming
//! the build backend and its extra module search paths. Only the
//! `[build-system]` table is consumed here; any other tables belong to the
//! backend and are ignored. A missing manifest file is treated as an empty
//! manifest so that callers can rely on the fallback backend.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur while loading a project manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
  #[error("cannot read manifest '{path}': {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("cannot parse manifest '{path}': {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },
}

/// The parsed project manifest.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Manifest {
  /// The `[build-system]` table, empty when not declared.
  #[serde(default, rename = "build-system")]
  pub build_system: BuildSystem,
}

/// The `[build-system]` table of a project manifest.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct BuildSystem {
  /// Backend spec string, e.g. `"mybackend:build_wheel"`.
  #[serde(default, rename = "build-backend")]
  pub build_backend: Option<String>,

  /// Extra module search directories for in-tree backends, relative to the
  /// manifest's directory.
  #[serde(default, rename = "backend-path")]
  pub backend_path: Vec<PathBuf>,
}

impl Manifest {
  /// Load a manifest from the given path.
  ///
  /// A nonexistent file yields the empty manifest; any other read or parse
  /// failure is an error.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
      Err(source) => {
        return Err(ManifestError::Io {
          path: path.display().to_string(),
          source,
        });
      }
    };

    toml::from_str(&content).map_err(|source| ManifestError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  /// The declared backend-path entries resolved against `base` (the
  /// manifest's directory). Absolute entries pass through unchanged.
  pub fn resolved_backend_path(&self, base: &Path) -> Vec<PathBuf> {
    self
      .build_system
      .backend_path
      .iter()
      .map(|entry| {
        if entry.is_absolute() {
          entry.clone()
        } else {
          base.join(entry)
        }
      })
      .collect()
  }
}
