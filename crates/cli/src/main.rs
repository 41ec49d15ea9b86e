mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use wheelwright_lib::consts;

use cmd::{BuildArgs, InstallArgs, OptimizeLevels};

/// wheelwright - build frontend for Lua wheel packages
#[derive(Parser)]
#[command(name = "wright")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Only report warnings and errors
  #[arg(short, long, global = true)]
  quiet: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the build backend declared in the project manifest
  GetBackend {
    /// Path to the project manifest
    #[arg(long, default_value = consts::DEFAULT_MANIFEST)]
    project_toml: PathBuf,
  },

  /// Build a wheel from sources
  Build {
    /// Directory to write the wheel into
    #[arg(long)]
    wheel_dir: PathBuf,

    #[command(flatten)]
    build: BuildArgs,
  },

  /// Install a built wheel into a staging root
  InstallWheel {
    #[command(flatten)]
    install: InstallArgs,

    /// Wheel to install
    wheel: PathBuf,
  },

  /// Build a wheel and install it without keeping the wheel around
  InstallFromSource {
    #[command(flatten)]
    build: BuildArgs,

    #[command(flatten)]
    install: InstallArgs,
  },

  /// Check installed module sources against their bytecode caches
  VerifyBytecode {
    /// Staging directory the tree was installed into
    #[arg(long)]
    destdir: PathBuf,

    /// Prefix the tree was installed under
    #[arg(long, default_value = consts::DEFAULT_PREFIX)]
    prefix: PathBuf,

    /// Optimization levels the caches are expected for
    #[arg(long, value_parser = cmd::parse_optimize, default_value = "all")]
    optimize: OptimizeLevels,
  },
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.quiet);

  let result = match &cli.command {
    Commands::GetBackend { project_toml } => cmd::cmd_get_backend(project_toml),
    Commands::Build { wheel_dir, build } => cmd::cmd_build(build, wheel_dir),
    Commands::InstallWheel { install, wheel } => cmd::cmd_install_wheel(install, wheel),
    Commands::InstallFromSource { build, install } => cmd::cmd_install_from_source(build, install),
    Commands::VerifyBytecode {
      destdir,
      prefix,
      optimize,
    } => cmd::cmd_verify_bytecode(destdir, prefix, &optimize.0),
  };

  let code = match result {
    Ok(code) => code,
    Err(err) => {
      eprintln!("{} {err:#}", "error:".red().bold());
      1
    }
  };
  std::process::exit(code);
}

fn init_tracing(quiet: bool) {
  let default_level = if quiet { "warn" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
