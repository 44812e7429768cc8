//! Splitting of oversized files into archive volumes.
//!
//! The external 7-Zip compressor stores the file without compression
//! (`-mx0`) into volumes of the configured size. Progress is read from its
//! stdout, diagnostics from stderr.

pub mod codec;
pub mod split_size;
pub mod staging;

use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fs::space::{SpaceProbe, SystemDisks};
use crate::fs::FileRecord;
use crate::utils::{ArchiveError, BackupError, Result};
use codec::ProgressDecoder;
pub use split_size::SplitSize;

/// Default compressor executable, looked up on PATH
pub const DEFAULT_COMPRESSOR: &str = "7za";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Something that turns one oversized file into ordered parts.
#[async_trait]
pub trait Splitter: Send + Sync {
    /// Split `record`, reporting percentages (0-100) to `progress`. Parts
    /// share the record's destination and are returned in volume order.
    async fn split(
        &self,
        record: &FileRecord,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<Vec<FileRecord>>;
}

/// Splitter backed by the 7-Zip command line
pub struct Archiver {
    compressor: PathBuf,
    staging_dir: PathBuf,
    split_size: SplitSize,
    space: Arc<dyn SpaceProbe>,
}

impl Archiver {
    pub fn new(compressor: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>, split_size: SplitSize) -> Self {
        Self {
            compressor: compressor.into(),
            staging_dir: staging_dir.into(),
            split_size,
            space: Arc::new(SystemDisks),
        }
    }

    pub fn with_space_probe(mut self, space: Arc<dyn SpaceProbe>) -> Self {
        self.space = space;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn command(&self, record: &FileRecord) -> Command {
        let archive = self.staging_dir.join(staging::archive_name(&record.name));

        let mut cmd = Command::new(&self.compressor);
        cmd.arg("a")
            .arg(archive)
            .arg(&record.path)
            .args(["-mx0", "-bsp1", "-bse2", "-y"])
            .arg(self.split_size.volume_arg())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }

    /// The staging volume must have strictly more free space than the file.
    fn check_free_space(&self, record: &FileRecord) -> std::result::Result<(), ArchiveError> {
        let available = self
            .space
            .available_space(&self.staging_dir)
            .ok_or_else(|| ArchiveError::FreeSpaceUnknown(self.staging_dir.clone()))?;

        if available <= record.length {
            return Err(ArchiveError::FreeSpaceInsufficient {
                volume: self.staging_dir.display().to_string(),
                required: record.length,
                available,
            });
        }
        Ok(())
    }

    fn prepare(&self, record: &FileRecord) -> std::result::Result<(), ArchiveError> {
        self.check_free_space(record)?;

        std::fs::create_dir_all(&self.staging_dir).map_err(|source| ArchiveError::StagingDir {
            dir: self.staging_dir.clone(),
            source,
        })?;

        staging::remove_stale(&self.staging_dir, &record.name).map_err(|source| {
            ArchiveError::CleanupFailed {
                dir: self.staging_dir.clone(),
                source,
            }
        })?;
        Ok(())
    }

    async fn run(
        &self,
        record: &FileRecord,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> std::result::Result<ExitStatus, Interrupted> {
        let mut child = self.command(record).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::CompressorMissing(self.compressor.clone())
            } else {
                ArchiveError::Spawn(e)
            }
        })?;
        debug!("Started {} for {}", self.compressor.display(), record.name);

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_string()
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut frames = FramedRead::new(stdout, ProgressDecoder::new());
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        terminate(&mut child, &record.name).await;
                        return Err(Interrupted::Cancelled);
                    }
                    frame = frames.next() => match frame {
                        Some(Ok(percent)) => progress(percent),
                        Some(Err(e)) => {
                            warn!("Stopped reading compressor output: {}", e);
                            break;
                        }
                        None => break,
                    },
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                terminate(&mut child, &record.name).await;
                return Err(Interrupted::Cancelled);
            }
            status = child.wait() => status.map_err(ArchiveError::Spawn)?,
        };

        if status.success() {
            return Ok(status);
        }

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        Err(ArchiveError::ProcessFailed {
            code: status.code(),
            stderr,
        }
        .into())
    }

    /// Drop volumes left by an interrupted run. The compressor has been
    /// reaped by then, so nothing is written after the scan.
    fn discard_partial(&self, record: &FileRecord) {
        if let Err(e) = staging::remove_stale(&self.staging_dir, &record.name) {
            warn!(
                "Failed to remove partial volumes of {} from {}: {}",
                record.name,
                self.staging_dir.display(),
                e
            );
        }
    }

    fn collect_parts(&self, record: &FileRecord) -> std::result::Result<Vec<FileRecord>, ArchiveError> {
        let scan_error = |source| ArchiveError::Scan {
            dir: self.staging_dir.clone(),
            source,
        };

        let mut parts = Vec::new();
        for path in staging::find_fragments(&self.staging_dir, &record.name).map_err(scan_error)? {
            let length = std::fs::metadata(&path).map_err(scan_error)?.len();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if length == 0 {
                warn!("Ignoring empty fragment {}", path.display());
                continue;
            }
            parts.push(FileRecord::new(name, path, record.destination.clone(), length));
        }

        if parts.is_empty() {
            return Err(ArchiveError::NoParts);
        }
        Ok(parts)
    }
}

/// Why the compressor run stopped early
enum Interrupted {
    Cancelled,
    Failed(ArchiveError),
}

impl From<ArchiveError> for Interrupted {
    fn from(e: ArchiveError) -> Self {
        Interrupted::Failed(e)
    }
}

/// Kill the compressor and reap it so no volume is written afterwards.
async fn terminate(child: &mut Child, name: &str) {
    match child.kill().await {
        Ok(()) => info!("Stopped compressor for {}", name),
        Err(e) => warn!("Failed to stop compressor for {}: {}", name, e),
    }
}

#[async_trait]
impl Splitter for Archiver {
    async fn split(
        &self,
        record: &FileRecord,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<Vec<FileRecord>> {
        let fail = |source| BackupError::Archive {
            file: record.name.clone(),
            source,
        };

        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        self.prepare(record).map_err(fail)?;
        info!(
            "Splitting {} ({}) into {} volumes in {}",
            record.name,
            record.size(),
            self.split_size,
            self.staging_dir.display()
        );

        match self.run(record, cancel, progress).await {
            Ok(_) => {}
            Err(Interrupted::Cancelled) => {
                self.discard_partial(record);
                return Err(BackupError::Cancelled);
            }
            Err(Interrupted::Failed(e)) => {
                self.discard_partial(record);
                return Err(fail(e));
            }
        }

        let parts = self.collect_parts(record).map_err(fail)?;
        info!("Split {} into {} part(s)", record.name, parts.len());
        Ok(parts)
    }
}
