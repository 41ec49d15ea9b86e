//! End-to-end build, install, and verify flows driven through the CLI.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use zip::CompressionMethod;

fn wright_cmd() -> Command {
  cargo_bin_cmd!("wright")
}

const MANIFEST: &str = r#"
[build-system]
build-backend = "demo_backend:build_wheel"
backend-path = ["backend"]
"#;

const DEMO_BACKEND: &str = r#"
local demo = {}

function demo.build_wheel(output_dir, config)
  local name = (config and config.name) or "demo"
  local filename = name .. "-1.0.whl"
  local w = wheel.create(output_dir .. "/" .. filename)
  w:add_data("purelib/demo.lua", "return { answer = 42 }\n")
  w:add_data("scripts/demo", "print(require('demo').answer)\n", { compress = "deflate" })
  w:finish()
  return filename
end

return demo
"#;

/// A project directory with a manifest, an in-tree backend, and a dist dir.
fn demo_project() -> TempDir {
  let temp = TempDir::new().unwrap();
  fs::write(temp.path().join("project.toml"), MANIFEST).unwrap();
  fs::create_dir(temp.path().join("backend")).unwrap();
  fs::write(temp.path().join("backend").join("demo_backend.lua"), DEMO_BACKEND).unwrap();
  fs::create_dir(temp.path().join("dist")).unwrap();
  temp
}

fn build_demo_wheel(project: &TempDir) {
  wright_cmd()
    .args(["build", "--wheel-dir", "dist"])
    .current_dir(project.path())
    .assert()
    .success()
    .stdout(predicate::eq("demo-1.0.whl\n"));
}

fn entry_compression(wheel: &Path, entry: &str) -> CompressionMethod {
  let file = fs::File::open(wheel).unwrap();
  let mut archive = zip::ZipArchive::new(file).unwrap();
  archive.by_name(entry).unwrap().compression()
}

// =============================================================================
// build
// =============================================================================

#[test]
fn build_produces_an_uncompressed_wheel() {
  let project = demo_project();
  build_demo_wheel(&project);

  let wheel = project.path().join("dist").join("demo-1.0.whl");
  assert!(wheel.is_file());
  assert_eq!(entry_compression(&wheel, "purelib/demo.lua"), CompressionMethod::Stored);
  // The backend asked for deflate; the default policy overrides it.
  assert_eq!(entry_compression(&wheel, "scripts/demo"), CompressionMethod::Stored);
}

#[test]
fn allow_compressed_honors_the_backend_request() {
  let project = demo_project();

  wright_cmd()
    .args(["build", "--wheel-dir", "dist", "--allow-compressed"])
    .current_dir(project.path())
    .assert()
    .success();

  let wheel = project.path().join("dist").join("demo-1.0.whl");
  assert_eq!(entry_compression(&wheel, "scripts/demo"), CompressionMethod::Deflated);
  assert_eq!(entry_compression(&wheel, "purelib/demo.lua"), CompressionMethod::Stored);
}

#[test]
fn config_json_reaches_the_backend() {
  let project = demo_project();

  wright_cmd()
    .args([
      "build",
      "--wheel-dir",
      "dist",
      "--config-json",
      r#"{"name": "custom"}"#,
    ])
    .current_dir(project.path())
    .assert()
    .success()
    .stdout(predicate::eq("custom-1.0.whl\n"));
}

#[test]
fn explicit_backend_overrides_the_manifest() {
  let project = demo_project();
  fs::write(
    project.path().join("backend").join("other_backend.lua"),
    r#"
      local m = {}
      function m.build_wheel(output_dir, config)
        local w = wheel.create(output_dir .. "/other-2.0.whl")
        w:finish()
        return "other-2.0.whl"
      end
      return m
    "#,
  )
  .unwrap();

  wright_cmd()
    .args(["build", "--wheel-dir", "dist", "--backend", "other_backend"])
    .current_dir(project.path())
    .assert()
    .success()
    .stdout(predicate::eq("other-2.0.whl\n"));
}

#[test]
fn backend_failure_has_its_own_exit_code() {
  let project = demo_project();
  fs::write(
    project.path().join("backend").join("angry_backend.lua"),
    r#"
      local m = {}
      function m.build_wheel(output_dir, config)
        error("boom")
      end
      return m
    "#,
  )
  .unwrap();

  wright_cmd()
    .args(["build", "--wheel-dir", "dist", "--backend", "angry_backend"])
    .current_dir(project.path())
    .assert()
    .failure()
    .code(4)
    .stderr(predicate::str::contains("boom"));
}

// =============================================================================
// install-wheel + verify-bytecode
// =============================================================================

#[test]
fn install_then_verify_round_trips() {
  let project = demo_project();
  build_demo_wheel(&project);

  wright_cmd()
    .args([
      "install-wheel",
      "--destdir",
      "stage",
      "--optimize",
      "0,1",
      "dist/demo-1.0.whl",
    ])
    .current_dir(project.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Install complete!"));

  let stage = project.path().join("stage");
  let module = stage.join("usr/local/share/lua/5.4/demo.lua");
  assert!(module.is_file());
  assert!(stage.join("usr/local/bin/demo").is_file());
  assert!(stage.join("usr/local/share/lua/5.4/.luac/demo.lua54.luac").is_file());
  assert!(
    stage
      .join("usr/local/share/lua/5.4/.luac/demo.lua54.opt-1.luac")
      .is_file()
  );

  wright_cmd()
    .args(["verify-bytecode", "--destdir", "stage", "--optimize", "0,1"])
    .current_dir(project.path())
    .assert()
    .success()
    .stdout(predicate::str::is_empty());
}

#[test]
fn verify_reports_missing_and_stray_caches() {
  let project = demo_project();
  build_demo_wheel(&project);

  wright_cmd()
    .args([
      "install-wheel",
      "--destdir",
      "stage",
      "--optimize",
      "0",
      "dist/demo-1.0.whl",
    ])
    .current_dir(project.path())
    .assert()
    .success();

  let cache_dir = project.path().join("stage/usr/local/share/lua/5.4/.luac");
  fs::remove_file(cache_dir.join("demo.lua54.luac")).unwrap();
  fs::write(cache_dir.join("ghost.lua54.luac"), b"\x1bLua").unwrap();

  wright_cmd()
    .args(["verify-bytecode", "--destdir", "stage", "--optimize", "0"])
    .current_dir(project.path())
    .assert()
    .failure()
    .code(1)
    .stdout(
      predicate::str::contains("missing:/usr/local/share/lua/5.4/demo.lua")
        .and(predicate::str::contains("stray:/usr/local/share/lua/5.4/ghost.lua")),
    );
}

#[test]
fn verify_flags_caches_for_unrequested_levels() {
  let project = demo_project();
  build_demo_wheel(&project);

  wright_cmd()
    .args([
      "install-wheel",
      "--destdir",
      "stage",
      "--optimize",
      "0,2",
      "dist/demo-1.0.whl",
    ])
    .current_dir(project.path())
    .assert()
    .success();

  wright_cmd()
    .args(["verify-bytecode", "--destdir", "stage", "--optimize", "0"])
    .current_dir(project.path())
    .assert()
    .failure()
    .code(1)
    .stdout(predicate::str::contains("mismatch:/usr/local/share/lua/5.4/demo.lua"));
}

// =============================================================================
// install-from-source
// =============================================================================

#[test]
fn install_from_source_discards_the_wheel() {
  let project = demo_project();

  wright_cmd()
    .args(["install-from-source", "--destdir", "stage", "--optimize", "all"])
    .current_dir(project.path())
    .assert()
    .success()
    .stdout(predicate::str::contains("Install complete!"));

  let stage = project.path().join("stage");
  assert!(stage.join("usr/local/share/lua/5.4/demo.lua").is_file());
  for cache in [
    "demo.lua54.luac",
    "demo.lua54.opt-1.luac",
    "demo.lua54.opt-2.luac",
  ] {
    assert!(stage.join("usr/local/share/lua/5.4/.luac").join(cache).is_file());
  }
  // The intermediate wheel is not kept anywhere in the project.
  assert!(!project.path().join("dist").join("demo-1.0.whl").exists());

  wright_cmd()
    .args(["verify-bytecode", "--destdir", "stage", "--optimize", "all"])
    .current_dir(project.path())
    .assert()
    .success();
}
