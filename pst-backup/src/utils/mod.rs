//! Shared error and logging utilities.

pub mod errors;
pub mod logger;

pub use errors::{ArchiveError, BackupError, PreconditionError, Result, UploadError};
