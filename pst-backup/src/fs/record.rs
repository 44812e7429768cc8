//! Local mailbox files and the archive parts produced from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::metadata::IntegrityTag;
use crate::policy;
use crate::transfer::progress::format_bytes;
use crate::utils::{BackupError, Result};

/// Opaque identity of a record, stable for the lifetime of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One local file and its backup target.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    id: RecordId,

    /// File name, including extension
    pub name: String,

    /// Full local path
    pub path: PathBuf,

    /// Remote destination folder (e.g. `/Documents/Backup`)
    pub destination: String,

    /// Length in bytes
    pub length: u64,

    /// Upload progress in [0, 1]
    progress: f64,

    /// Snapshot used only to detect local modification
    integrity: Option<IntegrityTag>,
}

impl FileRecord {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        destination: impl Into<String>,
        length: u64,
    ) -> Self {
        Self {
            id: RecordId::new(),
            name: name.into(),
            path: path.into(),
            destination: destination.into(),
            length,
            progress: 0.0,
            integrity: None,
        }
    }

    /// Build a record from a file on disk, capturing its integrity tag.
    pub fn from_path(path: &Path, destination: &str) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BackupError::Config(format!("{} has no file name", path.display())))?;
        let tag = IntegrityTag::from_path(path)?;

        let mut record = Self::new(name, path, destination, tag.length);
        record.integrity = Some(tag);
        Ok(record)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Human-readable size
    pub fn size(&self) -> String {
        format_bytes(self.length)
    }

    pub fn needs_split(&self) -> bool {
        policy::needs_split(self.length)
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Raise the progress to `fraction`. Never moves backwards.
    pub fn advance_progress(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.progress {
            self.progress = fraction;
        }
    }

    pub fn integrity(&self) -> Option<&IntegrityTag> {
        self.integrity.as_ref()
    }

    /// False when the file changed since its tag was captured. Records
    /// without a tag are assumed unmodified.
    pub fn is_unmodified(&self) -> bool {
        self.integrity
            .map(|tag| tag.matches(&self.path))
            .unwrap_or(true)
    }

    /// Full remote path of this file (`destination/name`).
    pub fn remote_path(&self) -> String {
        join_remote(&self.destination, &self.name)
    }

    /// Whether `self` is an archive part of `original`.
    pub fn is_part_of(&self, original: &FileRecord) -> bool {
        self.id != original.id
            && self.destination == original.destination
            && self.name.starts_with(&original.name)
    }
}

/// Join a remote folder and a file name. The root folder is `/`.
pub fn join_remote(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    format!("{}/{}", folder, name)
}

/// Check that a remote destination starts with `/` and doesn't end with one
/// (the root `/` itself is accepted).
pub fn validate_destination(destination: &str) -> Result<()> {
    if destination == "/" {
        return Ok(());
    }
    if !destination.starts_with('/') {
        return Err(BackupError::Config(format!(
            "destination '{}' must start with '/'",
            destination
        )));
    }
    if destination.ends_with('/') {
        return Err(BackupError::Config(format!(
            "destination '{}' must not end with '/'",
            destination
        )));
    }
    Ok(())
}
