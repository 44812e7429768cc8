//! Fragments of split archives in the staging directory.
//!
//! The compressor names the volumes of `mail.pst` as `mail.pst.7z.001`,
//! `mail.pst.7z.002`, ... (or `mail.pst.7z` when a single volume is
//! produced without numbering). Only those exact names belong to a file;
//! anything else sharing the directory is ignored.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Base archive name for `name`
pub fn archive_name(name: &str) -> String {
    format!("{}.7z", name)
}

/// Volume number of `entry` when it is a fragment of `name`: 0 for the
/// unnumbered archive, otherwise the numeric suffix.
pub fn fragment_index(name: &str, entry: &str) -> Option<u64> {
    let rest = entry.strip_prefix(&archive_name(name))?;
    if rest.is_empty() {
        return Some(0);
    }
    let digits = rest.strip_prefix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Fragments of `name` directly inside `dir`, ordered by volume number.
pub fn find_fragments(dir: &Path, name: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut fragments = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if let Some(index) = fragment_index(name, &file_name) {
            fragments.push((index, entry.into_path()));
        }
    }

    fragments.sort_by_key(|(index, _)| *index);
    debug!("Found {} fragment(s) of {} in {}", fragments.len(), name, dir.display());
    Ok(fragments.into_iter().map(|(_, path)| path).collect())
}

/// Delete fragments of `name` left by an earlier run. Returns how many were
/// removed. A missing directory has nothing to clean.
pub fn remove_stale(dir: &Path, name: &str) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let stale = find_fragments(dir, name)?;
    for path in &stale {
        std::fs::remove_file(path)?;
    }
    if !stale.is_empty() {
        info!("Removed {} stale fragment(s) of {}", stale.len(), name);
    }
    Ok(stale.len())
}
