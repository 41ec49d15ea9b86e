//! File placement for wheel installation.
//!
//! Wheel entries are category-prefixed (`purelib/`, `platlib/`, `scripts/`,
//! `data/`, `headers/`); each entry lands in the matching scheme directory,
//! re-rooted under the staging destdir. After placement every installed
//! module source is compiled to bytecode for the requested optimization
//! levels.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use mlua::prelude::*;
use tracing::debug;
use zip::ZipArchive;

use crate::bytecode;
use crate::scheme::{self, InstallScheme};

use super::{InstallError, InstallOptions, InstallReport};

pub(super) fn place_archive(
  wheel: &Path,
  scheme: &InstallScheme,
  options: &InstallOptions,
) -> Result<InstallReport, InstallError> {
  let file = File::open(wheel).map_err(|source| InstallError::Io {
    path: wheel.display().to_string(),
    source,
  })?;
  let mut archive = ZipArchive::new(BufReader::new(file))?;

  let mut files = 0usize;
  let mut module_sources: Vec<PathBuf> = Vec::new();

  for index in 0..archive.len() {
    let mut entry = archive.by_index(index)?;
    if entry.is_dir() {
      continue;
    }

    let entry_name = entry.name().to_string();
    let path = entry.enclosed_name().ok_or_else(|| InstallError::BadEntry {
      entry: entry_name.clone(),
      reason: "name escapes the archive root".to_string(),
    })?;

    let (category, relative) = split_category(&path).ok_or_else(|| InstallError::BadEntry {
      entry: entry_name.clone(),
      reason: "missing category prefix".to_string(),
    })?;
    let target_root = scheme.dir_for_category(&category).ok_or_else(|| InstallError::BadEntry {
      entry: entry_name.clone(),
      reason: format!("unknown category '{category}'"),
    })?;

    let dest = scheme::staged_path(&options.destdir, &target_root.join(&relative));
    write_entry(&mut entry, &dest)?;
    apply_mode(&dest, entry.unix_mode(), &category)?;
    debug!(entry = %entry_name, dest = %dest.display(), "placed file");
    files += 1;

    let is_module_dir = category == "purelib" || category == "platlib";
    if is_module_dir && dest.extension().and_then(|e| e.to_str()) == Some(bytecode::SOURCE_EXTENSION) {
      module_sources.push(dest);
    }
  }

  let bytecode_files = compile_modules(&module_sources, &options.optimization_levels)?;

  Ok(InstallReport {
    scheme: scheme.clone(),
    files,
    bytecode_files,
  })
}

/// Split a wheel entry into its category and the path below it.
fn split_category(path: &Path) -> Option<(String, PathBuf)> {
  let mut components = path.components();
  let category = match components.next() {
    Some(Component::Normal(name)) => name.to_string_lossy().into_owned(),
    _ => return None,
  };
  let relative: PathBuf = components.collect();
  if relative.as_os_str().is_empty() {
    return None;
  }
  Some((category, relative))
}

fn write_entry(entry: &mut impl std::io::Read, dest: &Path) -> Result<(), InstallError> {
  let io_err = |source| InstallError::Io {
    path: dest.display().to_string(),
    source,
  };

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(io_err)?;
  }
  let mut out = File::create(dest).map_err(io_err)?;
  std::io::copy(entry, &mut out).map_err(io_err)?;
  Ok(())
}

/// Carry over the archived unix mode; scripts default to executable when the
/// archive recorded none.
#[cfg(unix)]
fn apply_mode(dest: &Path, archived_mode: Option<u32>, category: &str) -> Result<(), InstallError> {
  use std::os::unix::fs::PermissionsExt;

  let mode = match (archived_mode, category) {
    (Some(mode), _) if mode & 0o777 != 0 => mode & 0o777,
    (_, "scripts") => 0o755,
    _ => return Ok(()),
  };

  fs::set_permissions(dest, fs::Permissions::from_mode(mode)).map_err(|source| InstallError::Io {
    path: dest.display().to_string(),
    source,
  })
}

#[cfg(not(unix))]
fn apply_mode(_dest: &Path, _archived_mode: Option<u32>, _category: &str) -> Result<(), InstallError> {
  Ok(())
}

/// Compile every placed module source for every requested level.
fn compile_modules(sources: &[PathBuf], levels: &[u8]) -> Result<usize, InstallError> {
  if sources.is_empty() || levels.is_empty() {
    return Ok(0);
  }

  let lua = Lua::new();
  let mut written = 0usize;
  for source in sources {
    for &level in levels {
      let chunk = bytecode::compile(&lua, source, level).map_err(|source_err| InstallError::Compile {
        path: source.display().to_string(),
        source: source_err,
      })?;

      let cache = bytecode::cache_path(source, level);
      let io_err = |source| InstallError::Io {
        path: cache.display().to_string(),
        source,
      };
      if let Some(parent) = cache.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
      }
      fs::write(&cache, chunk).map_err(io_err)?;
      written += 1;
    }
  }

  debug!(count = written, "wrote bytecode caches");
  Ok(written)
}
