//! File metadata snapshots used to detect local modification.
//!
//! A mailbox file that changes between selection and upload (the mail client
//! was reopened, for instance) would produce an inconsistent backup. The tag
//! captured here is compared again right before the file is processed.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Size and modification time of a file at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityTag {
    /// File size in bytes
    pub length: u64,

    /// Last modified time (nanoseconds since Unix epoch)
    pub modified: u128,
}

impl IntegrityTag {
    /// Capture the tag of a file on disk
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;

        let modified = metadata
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        Ok(Self {
            length: metadata.len(),
            modified,
        })
    }

    /// Whether the file at `path` still matches this tag.
    /// A file that can no longer be read counts as modified.
    pub fn matches(&self, path: &Path) -> bool {
        match Self::from_path(path) {
            Ok(current) => current == *self,
            Err(_) => false,
        }
    }
}
