//! Installed-tree bytecode verification.
//!
//! Walks the library directories of a staged installation and reports every
//! inconsistency between module sources and their bytecode caches. The
//! verifier only reads; findings are data, and an inconsistent tree is a
//! normal outcome surfaced through the returned map rather than an error.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::bytecode;
use crate::scheme;

/// Classification of a single inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingKind {
  /// A source file lacks its cache for a requested optimization level.
  Missing,
  /// A cache file has no corresponding source, or its name does not follow
  /// the cache naming at all.
  Stray,
  /// A cache belongs to an existing source but to an optimization level that
  /// was not requested.
  Mismatch,
}

impl fmt::Display for FindingKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FindingKind::Missing => "missing",
      FindingKind::Stray => "stray",
      FindingKind::Mismatch => "mismatch",
    };
    write!(f, "{name}")
  }
}

/// One inconsistency between a source file and a cache file.
///
/// For [`FindingKind::Missing`] the cache path is the expected one; for
/// [`FindingKind::Stray`] the source path is the one derived from the cache
/// name and does not exist on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Finding {
  pub source: PathBuf,
  pub cache: PathBuf,
}

/// All findings of one verification run, grouped by kind.
///
/// Every set empty (or every kind absent) means the tree is consistent.
pub type Findings = BTreeMap<FindingKind, BTreeSet<Finding>>;

/// Errors while walking the installed tree.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
  #[error("failed to walk installed tree: {message}")]
  Walk { message: String },
}

/// Verify the bytecode caches of an installed tree.
///
/// `root` is the staging directory, `library_dirs` are the prefix-absolute
/// module directories to scan (directories absent from the staged tree are
/// skipped), and `levels` are the optimization levels every source is
/// expected to be compiled for.
pub fn verify_bytecode(
  root: &Path,
  library_dirs: &[PathBuf],
  levels: &[u8],
) -> Result<Findings, VerifyError> {
  let mut findings = Findings::new();

  for library_dir in library_dirs {
    let staged = scheme::staged_path(root, library_dir);
    if !staged.is_dir() {
      continue;
    }
    scan_library_dir(&staged, levels, &mut findings)?;
  }

  Ok(findings)
}

fn scan_library_dir(dir: &Path, levels: &[u8], findings: &mut Findings) -> Result<(), VerifyError> {
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| VerifyError::Walk { message: e.to_string() })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let path = entry.path();

    if in_cache_dir(path) {
      check_cache_file(path, levels, findings);
    } else if path.extension().and_then(|e| e.to_str()) == Some(bytecode::SOURCE_EXTENSION) {
      check_source_file(path, levels, findings);
    }
  }
  Ok(())
}

fn in_cache_dir(path: &Path) -> bool {
  path
    .parent()
    .and_then(Path::file_name)
    .is_some_and(|name| name == bytecode::CACHE_DIR_NAME)
}

/// Every requested level must have its cache next to the source.
fn check_source_file(source: &Path, levels: &[u8], findings: &mut Findings) {
  for &level in levels {
    let cache = bytecode::cache_path(source, level);
    if !cache.is_file() {
      record(findings, FindingKind::Missing, source.to_path_buf(), cache);
    }
  }
}

/// A cache file must map back to an existing source at a requested level.
fn check_cache_file(cache: &Path, levels: &[u8], findings: &mut Findings) {
  let (source, level) = bytecode::source_for_cache(cache);

  let kind = match level {
    None => FindingKind::Stray,
    Some(_) if !source.is_file() => FindingKind::Stray,
    Some(level) if !levels.contains(&level) => FindingKind::Mismatch,
    Some(_) => return,
  };
  record(findings, kind, source, cache.to_path_buf());
}

fn record(findings: &mut Findings, kind: FindingKind, source: PathBuf, cache: PathBuf) {
  findings.entry(kind).or_default().insert(Finding { source, cache });
}
