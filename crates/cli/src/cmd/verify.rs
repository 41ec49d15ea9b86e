//! Implementation of the `wright verify-bytecode` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use wheelwright_lib::scheme::InstallScheme;
use wheelwright_lib::verify;

/// Scan the staged tree's module directories and print one line per finding
/// as `kind:source:cache`. Exits 1 when anything was found.
pub fn cmd_verify_bytecode(destdir: &Path, prefix: &Path, levels: &[u8]) -> Result<i32> {
  let scheme = InstallScheme::from_prefix(prefix, "");
  let library_dirs: Vec<PathBuf> = scheme
    .library_dirs()
    .iter()
    .map(|dir| dir.to_path_buf())
    .collect();

  debug!(destdir = %destdir.display(), ?levels, "verifying installed tree");
  let findings = verify::verify_bytecode(destdir, &library_dirs, levels)
    .with_context(|| format!("cannot verify tree under {}", destdir.display()))?;

  for (kind, group) in &findings {
    for finding in group {
      println!(
        "{}:{}:{}",
        kind,
        prefix_path(&finding.source, destdir),
        prefix_path(&finding.cache, destdir)
      );
    }
  }

  let clean = findings.values().all(|group| group.is_empty());
  Ok(if clean { 0 } else { 1 })
}

/// Render a staged path as it will appear after the staging root is merged
/// onto the filesystem.
fn prefix_path(path: &Path, root: &Path) -> String {
  match path.strip_prefix(root) {
    Ok(relative) => format!("/{}", relative.display()),
    Err(_) => path.display().to_string(),
  }
}
