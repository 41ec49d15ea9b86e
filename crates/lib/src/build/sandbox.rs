//! Runtime state isolation around a single backend invocation.
//!
//! Backends are third-party code with no contract about their own
//! cleanliness. The snapshot captures everything a backend can leak through
//! the shared runtime, and restoring it guarantees that two consecutive
//! invocations in one process never observe each other's loaded modules or
//! search-path mutations:
//!
//! - `package.path` and `package.cpath`
//! - the `package.loaded` key set (modules loaded during the call are
//!   unloaded afterwards)
//! - the `wheel` global injected for the call

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use tracing::debug;

/// State captured immediately before a backend call.
pub struct RuntimeSnapshot {
  search_path: String,
  c_search_path: String,
  loaded: BTreeSet<String>,
  wheel_global: LuaValue,
}

impl RuntimeSnapshot {
  /// Capture the current runtime state.
  pub fn capture(lua: &Lua) -> LuaResult<Self> {
    let package: LuaTable = lua.globals().get::<LuaTable>("package")?;
    Ok(Self {
      search_path: package.get("path")?,
      c_search_path: package.get("cpath")?,
      loaded: loaded_module_names(&package)?,
      wheel_global: lua.globals().get("wheel")?,
    })
  }

  /// Restore the captured state, unloading every module that appeared since
  /// the capture.
  ///
  /// Best effort: restoration failures are logged, not raised, so they never
  /// mask the backend's own error.
  pub fn restore(self, lua: &Lua) {
    if let Err(err) = self.try_restore(lua) {
      debug!(error = %err, "failed to restore runtime state after backend call");
    }
  }

  fn try_restore(self, lua: &Lua) -> LuaResult<()> {
    let package: LuaTable = lua.globals().get::<LuaTable>("package")?;

    let loaded: LuaTable = package.get("loaded")?;
    let new_modules: Vec<String> = loaded_module_names(&package)?
      .difference(&self.loaded)
      .cloned()
      .collect();
    for name in &new_modules {
      loaded.set(name.as_str(), LuaValue::Nil)?;
    }
    if !new_modules.is_empty() {
      debug!(count = new_modules.len(), "unloaded modules imported by the backend");
    }

    package.set("path", self.search_path.as_str())?;
    package.set("cpath", self.c_search_path.as_str())?;
    lua.globals().set("wheel", self.wheel_global)?;
    Ok(())
  }
}

/// Prepare `package.path` for a backend call.
///
/// Every template entry that resolves to the current working directory is
/// removed so a project-local module cannot shadow the backend by accident;
/// the backend's own extra search directories are then prepended.
pub fn isolate_search_path(lua: &Lua, extra_paths: &[PathBuf]) -> LuaResult<()> {
  let package: LuaTable = lua.globals().get::<LuaTable>("package")?;
  let current: String = package.get("path")?;
  let cwd = std::env::current_dir().map_err(LuaError::external)?;

  let mut parts: Vec<String> = extra_paths.iter().map(|dir| search_templates(dir)).collect();
  parts.extend(
    current
      .split(';')
      .filter(|entry| !entry_resolves_to(entry, &cwd))
      .map(str::to_string),
  );

  package.set("path", parts.join(";"))?;
  Ok(())
}

/// Search-path templates for a directory, in the shape Lua expects.
fn search_templates(dir: &Path) -> String {
  let dir = dir.to_string_lossy().replace('\\', "/");
  format!("{dir}/?.lua;{dir}/?/init.lua")
}

/// Whether a search-path template entry points into `dir`.
///
/// The entry's directory component is everything before the substitution
/// marker; an empty component means the current directory. Entries whose
/// directory cannot be canonicalized are kept.
fn entry_resolves_to(entry: &str, dir: &Path) -> bool {
  let prefix = match entry.split('?').next() {
    Some(prefix) => prefix.trim_end_matches(['/', '\\']),
    None => return false,
  };
  let entry_dir = if prefix.is_empty() { Path::new(".") } else { Path::new(prefix) };

  match (dunce::canonicalize(entry_dir), dunce::canonicalize(dir)) {
    (Ok(a), Ok(b)) => a == b,
    _ => false,
  }
}

fn loaded_module_names(package: &LuaTable) -> LuaResult<BTreeSet<String>> {
  let loaded: LuaTable = package.get("loaded")?;
  let mut names = BTreeSet::new();
  for pair in loaded.pairs::<String, LuaValue>() {
    let (name, _) = pair?;
    names.insert(name);
  }
  Ok(names)
}
