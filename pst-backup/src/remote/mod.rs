//! Remote storage capabilities used by the pipeline.
//!
//! The pipeline receives an already-authenticated client; it never acquires
//! tokens itself. [`graph::GraphDrive`] talks to OneDrive through Microsoft
//! Graph, tests use an in-memory implementation.

pub mod graph;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::transfer::ChunkRange;

/// What the remote does when the destination name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictBehavior {
    #[default]
    Replace,
    Rename,
}

impl ConflictBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictBehavior::Replace => "replace",
            ConflictBehavior::Rename => "rename",
        }
    }
}

impl fmt::Display for ConflictBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(ConflictBehavior::Replace),
            "rename" => Ok(ConflictBehavior::Rename),
            other => Err(format!("unknown conflict behavior '{}' (expected replace or rename)", other)),
        }
    }
}

/// Opaque handle of a server-side resumable upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle(pub String);

/// A file stored on the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
}

/// Outcome of one chunk submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The server stored the range and expects more
    Accepted,
    /// The upload is complete and the item exists
    Completed(RemoteItem),
}

/// Error reported by the storage provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Capability set of an authenticated remote drive
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Remaining quota in bytes, None when the provider doesn't report it
    async fn quota_remaining(&self) -> Result<Option<u64>, RemoteError>;

    /// Open a resumable upload for `path` (e.g. `/Backup/mail.pst`)
    async fn create_upload_session(
        &self,
        path: &str,
        conflict: ConflictBehavior,
    ) -> Result<SessionHandle, RemoteError>;

    /// Submit one byte range of a file of `total` bytes
    async fn submit_chunk(
        &self,
        session: &SessionHandle,
        range: ChunkRange,
        total: u64,
        data: Bytes,
    ) -> Result<ChunkOutcome, RemoteError>;

    /// Release the server-side state of an unfinished session
    async fn abort_session(&self, session: &SessionHandle) -> Result<(), RemoteError>;

    /// Upload a small file in a single request
    async fn direct_put(
        &self,
        path: &str,
        conflict: ConflictBehavior,
        data: Bytes,
    ) -> Result<RemoteItem, RemoteError>;
}
