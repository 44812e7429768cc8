//! Error types for the backup pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::remote::RemoteError;

/// Top-level error of a backup job.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Archiving {file} failed: {source}")]
    Archive {
        file: String,
        #[source]
        source: ArchiveError,
    },

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Cooperative, user-initiated. Terminal but not a failure.
    #[error("Backup cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Name of the pipeline phase the error belongs to, for user-facing messages.
    pub fn phase(&self) -> &'static str {
        match self {
            BackupError::Precondition(_) => "preconditions",
            BackupError::Archive { .. } => "archiving",
            BackupError::Upload(_) => "uploading",
            BackupError::Cancelled => "cancelled",
            BackupError::Config(_) => "configuration",
            BackupError::Io(_) => "i/o",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackupError::Cancelled)
    }
}

#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("{0} is currently running, close it and try again")]
    SourceAppRunning(String),

    #[error("Couldn't check whether the mail client is running: {0}")]
    ProcessProbe(String),

    #[error("Remote quota is not reported by the storage provider")]
    QuotaUnavailable,

    #[error("Couldn't query remote quota: {0}")]
    QuotaQuery(#[source] RemoteError),

    #[error("Not enough remote space: {required} bytes required, {remaining} remaining")]
    InsufficientQuota { required: u64, remaining: u64 },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Compressor executable not found: {0}")]
    CompressorMissing(PathBuf),

    #[error("Not enough space on {volume}: {required} bytes required, {available} available")]
    FreeSpaceInsufficient {
        volume: String,
        required: u64,
        available: u64,
    },

    #[error("Couldn't compute the available space for {0}")]
    FreeSpaceUnknown(PathBuf),

    #[error("Couldn't create staging directory {dir}: {source}")]
    StagingDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't delete previous archive parts in {dir}: {source}")]
    CleanupFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start compressor: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Compressor finished with exit code {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("Couldn't list archive parts in {dir}: {source}")]
    Scan {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Compressor reported success but produced no parts")]
    NoParts,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Couldn't create upload session for {file}: {source}")]
    SessionCreation {
        file: String,
        #[source]
        source: RemoteError,
    },

    #[error("Chunk {index}/{total} of {file} failed: {source}")]
    Chunk {
        file: String,
        index: usize,
        total: usize,
        #[source]
        source: RemoteError,
    },

    #[error("Direct upload of {file} failed: {source}")]
    DirectPut {
        file: String,
        #[source]
        source: RemoteError,
    },

    #[error("Couldn't read {file}: {source}")]
    Read {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected response while uploading {file}: {detail}")]
    UnexpectedResponse { file: String, detail: String },
}

pub type Result<T> = std::result::Result<T, BackupError>;
