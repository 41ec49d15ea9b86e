//! Lua runtime creation.

use mlua::prelude::*;

use crate::consts::FALLBACK_BACKEND_MODULE;

/// Source of the embedded fallback backend.
const FALLBACK_BACKEND_SOURCE: &str = include_str!("fallback.lua");

/// Create a new Lua runtime for backend invocations.
///
/// The runtime starts with the standard libraries and the embedded fallback
/// backend preloaded under [`FALLBACK_BACKEND_MODULE`]; everything else a
/// backend needs reaches it through the module search path at call time.
pub fn create_runtime() -> LuaResult<Lua> {
  let lua = Lua::new();
  register_fallback_backend(&lua)?;
  Ok(lua)
}

/// Register the embedded fallback backend in `package.preload`.
///
/// Preload entries survive module unloading, so the fallback stays reachable
/// across repeated backend invocations in one runtime.
fn register_fallback_backend(lua: &Lua) -> LuaResult<()> {
  let package: LuaTable = lua.globals().get::<LuaTable>("package")?;
  let preload: LuaTable = package.get("preload")?;
  let loader = lua
    .load(FALLBACK_BACKEND_SOURCE)
    .set_name(format!("@{FALLBACK_BACKEND_MODULE}"))
    .into_function()?;
  preload.set(FALLBACK_BACKEND_MODULE, loader)?;
  Ok(())
}
