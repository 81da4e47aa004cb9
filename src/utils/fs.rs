//! File-system helpers for generated output.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Result of [`write_if_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Write `content` to `path` unless the file already holds the same bytes.
///
/// Freshness is decided by content hash rather than mtime, so regenerating
/// from unchanged metadata leaves files (and their timestamps) untouched.
pub fn write_if_changed(path: &Path, content: &[u8]) -> Result<WriteOutcome> {
    if let Ok(existing) = fs::read(path)
        && blake3::hash(&existing) == blake3::hash(content)
    {
        return Ok(WriteOutcome::Unchanged);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(WriteOutcome::Written)
}

/// Remove a file, returning whether anything was deleted.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Remove `dir` with everything in it and create it again, empty.
pub fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to clear output directory: {}", dir.display()))?;
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))
}

/// All regular files below `dir`, sorted.
pub fn collect_all_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

/// Hex-encoded blake3 digest, used as an asset version string.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(blake3::hash(content).as_bytes())
}
