//! Bytecode cache naming and compilation.
//!
//! Installed `.lua` sources carry precompiled bytecode companions in a cache
//! subdirectory next to the source file:
//!
//! ```text
//! mod.lua
//! .luac/mod.lua54.luac         level 0, debug info kept
//! .luac/mod.lua54.opt-1.luac   level 1 and up, debug info stripped
//! ```
//!
//! The name embeds the interpreter tag so caches from a different interpreter
//! version are never mistaken for current ones.

use std::fs;
use std::path::{Path, PathBuf};

use mlua::prelude::*;

/// Name of the cache subdirectory placed next to sources.
pub const CACHE_DIR_NAME: &str = ".luac";

/// Interpreter tag embedded in cache file names.
pub const CACHE_TAG: &str = "lua54";

/// Extension of installable module sources.
pub const SOURCE_EXTENSION: &str = "lua";

/// Extension of bytecode cache files.
pub const CACHE_EXTENSION: &str = "luac";

/// The expected cache path for a source file at an optimization level.
pub fn cache_path(source: &Path, level: u8) -> PathBuf {
  let stem = source
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();
  let name = match level {
    0 => format!("{stem}.{CACHE_TAG}.{CACHE_EXTENSION}"),
    n => format!("{stem}.{CACHE_TAG}.opt-{n}.{CACHE_EXTENSION}"),
  };
  source
    .parent()
    .unwrap_or(Path::new(""))
    .join(CACHE_DIR_NAME)
    .join(name)
}

/// Derive the source path and optimization level a cache file belongs to.
///
/// The level is `None` when the file name does not follow the tagged cache
/// naming; the source path is then a best-effort guess from the part of the
/// name before the first dot. The cache file is assumed to live inside a
/// [`CACHE_DIR_NAME`] directory, so the source directory is its grandparent.
pub fn source_for_cache(cache: &Path) -> (PathBuf, Option<u8>) {
  let source_dir = cache
    .parent()
    .and_then(Path::parent)
    .unwrap_or(Path::new(""))
    .to_path_buf();
  let name = cache.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

  let fallback_stem = name.split('.').next().unwrap_or_default().to_string();
  let fallback = (
    source_dir.join(format!("{fallback_stem}.{SOURCE_EXTENSION}")),
    None,
  );

  let mut parts: Vec<&str> = name.split('.').collect();
  if parts.pop() != Some(CACHE_EXTENSION) {
    return fallback;
  }

  let level = match parts.last().and_then(|part| part.strip_prefix("opt-")) {
    Some(digits) => match digits.parse::<u8>() {
      Ok(level) if level >= 1 => {
        parts.pop();
        level
      }
      _ => return fallback,
    },
    None => 0,
  };

  if parts.pop() != Some(CACHE_TAG) || parts.is_empty() {
    return fallback;
  }

  let stem = parts.join(".");
  (
    source_dir.join(format!("{stem}.{SOURCE_EXTENSION}")),
    Some(level),
  )
}

/// Compile a source file to bytecode for the given optimization level.
///
/// Level 0 keeps debug information; higher levels strip it.
pub fn compile(lua: &Lua, source: &Path, level: u8) -> LuaResult<Vec<u8>> {
  let content = fs::read_to_string(source)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", source.display(), e)))?;

  let function = lua
    .load(&content)
    .set_name(format!("@{}", source.display()))
    .into_function()?;

  Ok(function.dump(level >= 1))
}
