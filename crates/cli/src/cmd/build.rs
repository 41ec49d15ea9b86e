//! Implementation of the `wright build` command.

use std::path::{Path, PathBuf};

use anyhow::Result;

use wheelwright_lib::backend;
use wheelwright_lib::build::{BuildRequest, Frontend};
use wheelwright_lib::manifest::Manifest;

use super::{BuildArgs, FrontendError, fail};

/// Build a wheel and print its filename to stdout.
pub fn cmd_build(args: &BuildArgs, wheel_dir: &Path) -> Result<i32> {
  match build_wheel(args, wheel_dir) {
    Ok(name) => {
      println!("{name}");
      Ok(0)
    }
    Err(err) => Ok(fail(err)),
  }
}

fn build_wheel(args: &BuildArgs, wheel_dir: &Path) -> Result<String, FrontendError> {
  let frontend = Frontend::new()?;
  let request = request_from_args(args, wheel_dir)?;
  Ok(frontend.build_wheel(&request)?)
}

/// Resolve the backend and assemble the build request from the flags and the
/// manifest.
pub(super) fn request_from_args(args: &BuildArgs, wheel_dir: &Path) -> Result<BuildRequest, FrontendError> {
  let manifest = Manifest::load(&args.project_toml)?;
  let fallback = (!args.no_fallback_backend).then_some(args.fallback_backend.as_str());
  let spec = backend::resolve(args.backend.as_deref(), &manifest, fallback)?;

  Ok(BuildRequest {
    backend: spec,
    extra_search_paths: manifest.resolved_backend_path(&manifest_dir(&args.project_toml)),
    output_dir: wheel_dir.to_path_buf(),
    config_settings: args.config_json.clone(),
    allow_compressed: args.allow_compressed,
  })
}

fn manifest_dir(manifest_path: &Path) -> PathBuf {
  match manifest_path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  }
}
