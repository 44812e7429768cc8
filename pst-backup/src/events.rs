//! Progress and lifecycle events for front ends.
//!
//! The pipeline publishes events on a broadcast channel; any number of
//! subscribers (the CLI printer, a GUI bridge) can listen. Publishing never
//! blocks the worker, and slow subscribers lose the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::executor::JobState;

/// Maximum number of queued events per subscriber
const EVENT_CAPACITY: usize = 1000;

/// Events emitted while a backup job runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BackupEvent {
    /// The job entered a new state
    #[serde(rename = "job:state")]
    JobState { job_id: String, state: JobState },

    /// Compressor progress for one file (0-100)
    #[serde(rename = "archive:progress")]
    ArchiveProgress {
        job_id: String,
        file: String,
        percent: u8,
    },

    /// Upload progress of one artifact (0-100)
    #[serde(rename = "upload:progress")]
    UploadProgress(UploadProgressPayload),

    /// An artifact reached the remote
    #[serde(rename = "upload:item")]
    UploadItem {
        job_id: String,
        name: String,
        remote_id: String,
    },

    /// Throughput over the last sampling period
    #[serde(rename = "upload:speed")]
    UploadSpeed { bytes_per_second: u64, speed: String },

    /// The job reached a terminal state
    #[serde(rename = "job:finished")]
    JobFinished {
        job_id: String,
        state: JobState,
        uploaded: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Progress of a single upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadProgressPayload {
    pub job_id: String,
    /// Original file name
    pub file: String,
    /// Name of the artifact being uploaded (the file itself or a part)
    pub artifact: String,
    /// One-based file number and file count
    pub file_number: usize,
    pub total_files: usize,
    /// One-based part number and part count, when the file was split
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<(usize, usize)>,
    pub percent: u8,
}

/// Broadcast channel shared by the pipeline and its observers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BackupEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: BackupEvent) {
        match self.tx.send(event) {
            Ok(count) => trace!("Published event to {} subscriber(s)", count),
            Err(_) => trace!("Dropped event, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
