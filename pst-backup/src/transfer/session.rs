//! Upload of a single artifact, either in one request or through a
//! resumable session.
//!
//! Chunks are submitted strictly in order over one session, each a blocking
//! request/response. A session that was opened is always aborted before a
//! cancellation or a chunk failure is reported, so no partial upload is left
//! on the server.

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chunk::{plan_chunks, ChunkRange, DEFAULT_CHUNK_SIZE};
use super::progress::{chunk_percent, format_bytes};
use crate::fs::FileRecord;
use crate::remote::{ChunkOutcome, ConflictBehavior, RemoteItem, RemoteStorage, SessionHandle};
use crate::utils::{BackupError, Result, UploadError};

/// Files up to this size go up in a single request (10 MiB)
pub const DEFAULT_DIRECT_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    pub chunk_size: u64,
    pub direct_upload_limit: u64,
    pub conflict: ConflictBehavior,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            direct_upload_limit: DEFAULT_DIRECT_UPLOAD_LIMIT,
            conflict: ConflictBehavior::default(),
        }
    }
}

/// Drives the upload of one file or part
pub struct UploadSession<'a> {
    storage: &'a dyn RemoteStorage,
    settings: UploadSettings,
    cancel: &'a CancellationToken,
}

impl<'a> UploadSession<'a> {
    pub fn new(
        storage: &'a dyn RemoteStorage,
        settings: UploadSettings,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            storage,
            settings,
            cancel,
        }
    }

    /// Upload `record` to `destination/name`. `on_progress` receives
    /// percentages (0-100) in non-decreasing order.
    pub async fn upload<F>(&self, record: &FileRecord, on_progress: F) -> Result<RemoteItem>
    where
        F: FnMut(u8),
    {
        if self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        if self.settings.chunk_size == 0 {
            return Err(BackupError::Config("upload chunk size must be greater than zero".to_string()));
        }

        if record.length <= self.settings.direct_upload_limit {
            self.upload_direct(record, on_progress).await
        } else {
            self.upload_chunked(record, on_progress).await
        }
    }

    async fn upload_direct<F>(&self, record: &FileRecord, mut on_progress: F) -> Result<RemoteItem>
    where
        F: FnMut(u8),
    {
        info!("Uploading {} ({}) in a single request", record.name, record.size());

        let data = tokio::fs::read(&record.path)
            .await
            .map_err(|source| UploadError::Read {
                file: record.name.clone(),
                source,
            })?;

        let path = record.remote_path();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BackupError::Cancelled),
            result = self.storage.direct_put(&path, self.settings.conflict, Bytes::from(data)) => result,
        };

        let item = result.map_err(|source| UploadError::DirectPut {
            file: record.name.clone(),
            source,
        })?;

        on_progress(100);
        info!("Uploaded {} (id {})", record.name, item.id);
        Ok(item)
    }

    async fn upload_chunked<F>(&self, record: &FileRecord, mut on_progress: F) -> Result<RemoteItem>
    where
        F: FnMut(u8),
    {
        let mut file = File::open(&record.path)
            .await
            .map_err(|source| UploadError::Read {
                file: record.name.clone(),
                source,
            })?;

        let path = record.remote_path();
        let handle = self
            .storage
            .create_upload_session(&path, self.settings.conflict)
            .await
            .map_err(|source| UploadError::SessionCreation {
                file: record.name.clone(),
                source,
            })?;

        let ranges = plan_chunks(record.length, self.settings.chunk_size);
        let total = ranges.len();
        info!(
            "Uploading {} ({}) in {} chunks of {}",
            record.name,
            record.size(),
            total,
            format_bytes(self.settings.chunk_size)
        );

        for (index, range) in ranges.into_iter().enumerate() {
            let number = index + 1;

            if self.cancel.is_cancelled() {
                self.abort(&handle, &record.name).await;
                return Err(BackupError::Cancelled);
            }

            let data = match read_range(&mut file, range).await {
                Ok(data) => data,
                Err(source) => {
                    self.abort(&handle, &record.name).await;
                    return Err(UploadError::Read {
                        file: record.name.clone(),
                        source,
                    }
                    .into());
                }
            };

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.abort(&handle, &record.name).await;
                    return Err(BackupError::Cancelled);
                }
                outcome = self.storage.submit_chunk(&handle, range, record.length, data) => outcome,
            };
            debug!("Chunk {}/{} of {} submitted", number, total, record.name);

            let is_last = number == total;
            let unexpected = match outcome {
                Ok(ChunkOutcome::Accepted) if !is_last => None,
                Ok(ChunkOutcome::Completed(item)) if is_last => {
                    on_progress(chunk_percent(number, total));
                    info!("Uploaded {} (id {})", record.name, item.id);
                    return Ok(item);
                }
                Ok(ChunkOutcome::Accepted) => Some("final chunk accepted without an item".to_string()),
                Ok(ChunkOutcome::Completed(_)) => {
                    Some(format!("upload completed after chunk {} of {}", number, total))
                }
                Err(source) => {
                    self.abort(&handle, &record.name).await;
                    return Err(UploadError::Chunk {
                        file: record.name.clone(),
                        index: number,
                        total,
                        source,
                    }
                    .into());
                }
            };

            if let Some(detail) = unexpected {
                self.abort(&handle, &record.name).await;
                return Err(UploadError::UnexpectedResponse {
                    file: record.name.clone(),
                    detail,
                }
                .into());
            }

            on_progress(chunk_percent(number, total));
        }

        self.abort(&handle, &record.name).await;
        Err(UploadError::UnexpectedResponse {
            file: record.name.clone(),
            detail: "no chunks to upload".to_string(),
        }
        .into())
    }

    /// Release the server-side session. Failures are logged; the caller is
    /// already reporting a more relevant outcome.
    async fn abort(&self, handle: &SessionHandle, name: &str) {
        match self.storage.abort_session(handle).await {
            Ok(()) => info!("Aborted upload session for {}", name),
            Err(e) => warn!("Failed to abort upload session for {}: {}", name, e),
        }
    }
}

/// Read the next `range` of a file read sequentially from the start.
async fn read_range(file: &mut File, range: ChunkRange) -> std::io::Result<Bytes> {
    let mut buf = vec![0u8; range.len() as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}
