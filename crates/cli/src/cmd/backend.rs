//! Implementation of the `wright get-backend` command.

use std::path::Path;

use anyhow::Result;

use wheelwright_lib::manifest::Manifest;

use super::fail;

/// Print the backend declared in the manifest, or an empty line when the
/// manifest is absent or declares none.
pub fn cmd_get_backend(project_toml: &Path) -> Result<i32> {
  let manifest = match Manifest::load(project_toml) {
    Ok(manifest) => manifest,
    Err(err) => return Ok(fail(err.into())),
  };

  println!("{}", manifest.build_system.build_backend.as_deref().unwrap_or(""));
  Ok(0)
}
