//! Build backend selection.
//!
//! A backend is named by a spec string of the form `module[:attr[.attr...]]`:
//! the Lua module to load, followed by an optional chain of table fields to
//! walk after loading it. Selection follows a fixed precedence: an explicit
//! override wins over the manifest's `build-system.build-backend`, which wins
//! over the configured fallback.

use std::fmt;

use crate::manifest::Manifest;

/// Errors produced while determining which backend to use.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("manifest is missing or does not declare a build backend, and the fallback backend is disabled")]
  NoBackend,

  #[error("invalid backend spec '{spec}': {reason}")]
  InvalidSpec { spec: String, reason: String },
}

/// A parsed backend spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
  /// Module name passed to the Lua loader, e.g. `"mybackend.meta"`.
  pub module: String,
  /// Table fields walked on the loaded module to reach the entry point.
  pub attrs: Vec<String>,
}

impl BackendSpec {
  /// Parse a spec string of the form `module[:attr[.attr...]]`.
  pub fn parse(spec: &str) -> Result<Self, ConfigError> {
    let (module, attr_part) = match spec.split_once(':') {
      Some((module, attrs)) => (module, Some(attrs)),
      None => (spec, None),
    };

    if module.is_empty() {
      return Err(ConfigError::InvalidSpec {
        spec: spec.to_string(),
        reason: "empty module name".to_string(),
      });
    }

    let attrs = match attr_part {
      None => Vec::new(),
      Some(attrs) => {
        let parts: Vec<String> = attrs.split('.').map(str::to_string).collect();
        if parts.iter().any(String::is_empty) {
          return Err(ConfigError::InvalidSpec {
            spec: spec.to_string(),
            reason: "empty attribute segment".to_string(),
          });
        }
        parts
      }
    };

    Ok(Self {
      module: module.to_string(),
      attrs,
    })
  }
}

impl fmt::Display for BackendSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.attrs.is_empty() {
      write!(f, "{}", self.module)
    } else {
      write!(f, "{}:{}", self.module, self.attrs.join("."))
    }
  }
}

/// Determine the backend spec for a build.
///
/// Precedence: `explicit` override, then the manifest declaration, then
/// `fallback`. Passing `fallback = None` means the fallback is disabled, in
/// which case an undeclared backend is a [`ConfigError::NoBackend`].
pub fn resolve(
  explicit: Option<&str>,
  manifest: &Manifest,
  fallback: Option<&str>,
) -> Result<BackendSpec, ConfigError> {
  let spec = explicit
    .or(manifest.build_system.build_backend.as_deref())
    .or(fallback)
    .ok_or(ConfigError::NoBackend)?;

  BackendSpec::parse(spec)
}
