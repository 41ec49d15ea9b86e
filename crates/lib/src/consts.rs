//! Shared constants.

/// Application name, used for logging targets and diagnostics.
pub const APP_NAME: &str = "wheelwright";

/// Default project manifest file name.
pub const DEFAULT_MANIFEST: &str = "project.toml";

/// Default installation prefix.
pub const DEFAULT_PREFIX: &str = "/usr/local";

/// Module name of the embedded fallback build backend.
pub const FALLBACK_BACKEND_MODULE: &str = "wheelwright.default";

/// Every bytecode optimization level the installer knows how to produce.
pub const ALL_OPT_LEVELS: [u8; 3] = [0, 1, 2];
