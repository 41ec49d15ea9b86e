//! Implementations of the `wright install-wheel` and `wright
//! install-from-source` commands.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use wheelwright_lib::build::Frontend;
use wheelwright_lib::install::{self, InstallReport};

use super::{BuildArgs, InstallArgs, fail};

/// Install an already built wheel into the staging root.
pub fn cmd_install_wheel(args: &InstallArgs, wheel: &Path) -> Result<i32> {
  let started = Instant::now();

  match install::install_wheel(wheel, &args.to_options()) {
    Ok(report) => {
      print_summary(&report, started);
      Ok(0)
    }
    Err(err) => Ok(fail(err.into())),
  }
}

/// Build a wheel into a temporary directory and install it.
pub fn cmd_install_from_source(build: &BuildArgs, install: &InstallArgs) -> Result<i32> {
  let started = Instant::now();

  let frontend = match Frontend::new() {
    Ok(frontend) => frontend,
    Err(err) => return Ok(fail(err.into())),
  };
  // The wheel directory on the request is replaced by a temporary directory.
  let request = match super::build::request_from_args(build, Path::new(".")) {
    Ok(request) => request,
    Err(err) => return Ok(fail(err)),
  };

  match install::install_from_source(&frontend, request, &install.to_options()) {
    Ok(report) => {
      print_summary(&report, started);
      Ok(0)
    }
    Err(err) => Ok(fail(err.into())),
  }
}

fn print_summary(report: &InstallReport, started: Instant) {
  let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
  println!();
  println!("Install complete!");
  println!("  Files placed: {}", report.files);
  println!("  Bytecode caches: {}", report.bytecode_files);
  println!("  Modules dir: {}", report.scheme.purelib.display());
  println!("  Elapsed: {}", humantime::format_duration(elapsed));
}
