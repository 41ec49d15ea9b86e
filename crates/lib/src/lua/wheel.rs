//! The `wheel` API exposed to build backends.
//!
//! Backends produce their archive through a [`WheelWriter`] obtained from
//! `wheel.create(path)`. The writer owns the compression policy: when the
//! build disallows compressed wheels, every entry is written with the stored
//! method no matter what the backend asks for per entry. The policy is fixed
//! at construction, so nothing process-wide is patched or restored.
//!
//! ```lua
//! local w = wheel.create(output_dir .. "/demo-1.0.whl")
//! w:add_data("purelib/demo.lua", "return {}\n")
//! w:add_file("scripts/demo", "bin/demo", { compress = "deflate" })
//! w:add_tree("purelib", "src")
//! w:finish()
//! ```

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Streaming zip writer handed to backends as userdata.
pub struct WheelWriter {
  path: PathBuf,
  inner: Option<ZipWriter<File>>,
  allow_compressed: bool,
}

impl WheelWriter {
  /// Create a writer for a new wheel at `path`.
  pub fn create(path: PathBuf, allow_compressed: bool) -> LuaResult<Self> {
    let file = File::create(&path)
      .map_err(|e| LuaError::external(format!("cannot create wheel '{}': {}", path.display(), e)))?;
    Ok(Self {
      path,
      inner: Some(ZipWriter::new(file)),
      allow_compressed,
    })
  }

  fn writer(&mut self) -> LuaResult<&mut ZipWriter<File>> {
    self
      .inner
      .as_mut()
      .ok_or_else(|| LuaError::external("wheel is already finished"))
  }

  /// Entry options for a backend-requested compression table.
  ///
  /// With compression disallowed the request is ignored entirely and the
  /// entry is stored; otherwise `compress` may be `"store"` or `"deflate"`
  /// (the default) with an optional `level`.
  fn entry_options(&self, requested: Option<LuaTable>) -> LuaResult<SimpleFileOptions> {
    if !self.allow_compressed {
      return Ok(SimpleFileOptions::default().compression_method(CompressionMethod::Stored));
    }

    let (method, level) = match requested {
      None => (None, None),
      Some(table) => (
        table.get::<Option<String>>("compress")?,
        table.get::<Option<i64>>("level")?,
      ),
    };

    let method = match method.as_deref() {
      None | Some("deflate") => CompressionMethod::Deflated,
      Some("store") => CompressionMethod::Stored,
      Some(other) => {
        return Err(LuaError::external(format!(
          "unknown compression method '{other}' (expected 'store' or 'deflate')"
        )));
      }
    };

    let mut options = SimpleFileOptions::default().compression_method(method);
    if level.is_some() {
      options = options.compression_level(level);
    }
    Ok(options)
  }

  fn add_data(&mut self, name: &str, data: &[u8], requested: Option<LuaTable>) -> LuaResult<()> {
    let options = self.entry_options(requested)?;
    let writer = self.writer()?;
    writer
      .start_file(name, options)
      .map_err(|e| LuaError::external(format!("cannot add entry '{name}': {e}")))?;
    writer
      .write_all(data)
      .map_err(|e| LuaError::external(format!("cannot write entry '{name}': {e}")))?;
    Ok(())
  }

  fn add_file(&mut self, name: &str, source: &Path, requested: Option<LuaTable>) -> LuaResult<()> {
    let options = self.entry_options(requested)?;

    #[cfg(unix)]
    let options = {
      use std::os::unix::fs::PermissionsExt;
      let metadata = std::fs::metadata(source)
        .map_err(|e| LuaError::external(format!("cannot stat '{}': {}", source.display(), e)))?;
      options.unix_permissions(metadata.permissions().mode())
    };

    let content = std::fs::read(source)
      .map_err(|e| LuaError::external(format!("cannot read '{}': {}", source.display(), e)))?;

    let writer = self.writer()?;
    writer
      .start_file(name, options)
      .map_err(|e| LuaError::external(format!("cannot add entry '{name}': {e}")))?;
    writer
      .write_all(&content)
      .map_err(|e| LuaError::external(format!("cannot write entry '{name}': {e}")))?;
    Ok(())
  }

  fn add_tree(&mut self, prefix: &str, dir: &Path, requested: Option<LuaTable>) -> LuaResult<()> {
    if !dir.is_dir() {
      return Err(LuaError::external(format!(
        "'{}' is not a directory",
        dir.display()
      )));
    }

    let prefix = prefix.trim_end_matches('/');
    for entry in WalkDir::new(dir).sort_by_file_name() {
      let entry = entry.map_err(|e| LuaError::external(format!("cannot walk '{}': {}", dir.display(), e)))?;
      if !entry.file_type().is_file() {
        continue;
      }

      let relative = entry
        .path()
        .strip_prefix(dir)
        .map_err(|e| LuaError::external(e.to_string()))?;
      let name = format!("{}/{}", prefix, relative.to_string_lossy().replace('\\', "/"));
      self.add_file(&name, entry.path(), requested.clone())?;
    }
    Ok(())
  }

  fn finish(&mut self) -> LuaResult<()> {
    let writer = self
      .inner
      .take()
      .ok_or_else(|| LuaError::external("wheel is already finished"))?;
    writer
      .finish()
      .map_err(|e| LuaError::external(format!("cannot finish wheel '{}': {}", self.path.display(), e)))?;
    Ok(())
  }
}

impl LuaUserData for WheelWriter {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("path", |_, this| Ok(this.path.to_string_lossy().to_string()));
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_method_mut(
      "add_data",
      |_, this, (name, data, opts): (String, LuaString, Option<LuaTable>)| {
        let bytes = data.as_bytes();
        this.add_data(&name, &bytes, opts)
      },
    );

    methods.add_method_mut(
      "add_file",
      |_, this, (name, source, opts): (String, String, Option<LuaTable>)| {
        this.add_file(&name, Path::new(&source), opts)
      },
    );

    methods.add_method_mut(
      "add_tree",
      |_, this, (prefix, dir, opts): (String, String, Option<LuaTable>)| {
        this.add_tree(&prefix, Path::new(&dir), opts)
      },
    );

    methods.add_method_mut("finish", |_, this, ()| this.finish());
  }
}

/// Install the `wheel` global for one backend invocation.
///
/// The caller is responsible for removing the global again afterwards; the
/// invocation snapshot takes care of that.
pub fn register_wheel_api(lua: &Lua, allow_compressed: bool) -> LuaResult<()> {
  let wheel = lua.create_table()?;

  let create = lua.create_function(move |_, path: String| {
    WheelWriter::create(PathBuf::from(path), allow_compressed)
  })?;
  wheel.set("create", create)?;

  let is_dir = lua.create_function(|_, path: String| Ok(Path::new(&path).is_dir()))?;
  wheel.set("is_dir", is_dir)?;

  lua.globals().set("wheel", wheel)?;
  Ok(())
}
