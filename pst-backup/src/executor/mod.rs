//! Backup job executor - drives one job through preconditions, archiving
//! and uploading.
//!
//! The job runs on a single worker, one file at a time and one part at a
//! time. Cancellation is checked before every unit of work; whatever was
//! uploaded before it stays uploaded and is reported.

pub mod in_flight;
pub mod job;
pub mod manifest;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::archive::Splitter;
use crate::events::{BackupEvent, EventBus, UploadProgressPayload};
use crate::fs::FileRecord;
use crate::policy::SizePolicy;
use crate::precheck::{Preconditions, ProcessProbe, SystemProcesses, DEFAULT_SOURCE_PROCESSES};
use crate::remote::RemoteStorage;
use crate::transfer::progress::PartPosition;
use crate::transfer::{BandwidthMonitor, SentCounter, UploadSession};
use crate::utils::{BackupError, Result};
pub use in_flight::{InFlight, InFlightView};
pub use job::{BackupJob, PendingList};
pub use manifest::UploadResult;

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    CheckingPreconditions,
    Archiving,
    Uploading,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::CheckingPreconditions => "checking preconditions",
            JobState::Archiving => "archiving",
            JobState::Uploading => "uploading",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a job run
#[derive(Debug)]
pub struct JobReport {
    pub job_id: String,
    pub state: JobState,
    /// Artifacts uploaded before the job ended, whatever the state
    pub uploads: UploadResult,
    /// Set when the state is `Failed`
    pub error: Option<BackupError>,
}

/// An artifact scheduled for upload and where it sits in its file
struct Artifact<'a> {
    record: &'a FileRecord,
    position: PartPosition,
}

/// Runs backup jobs against one remote.
pub struct BackupOrchestrator {
    storage: Arc<dyn RemoteStorage>,
    splitter: Arc<dyn Splitter>,
    processes: Arc<dyn ProcessProbe>,
    watched: Vec<String>,
    policy: SizePolicy,
    events: EventBus,
    sent: SentCounter,
    in_flight: InFlight,
    cancel: CancellationToken,
}

impl BackupOrchestrator {
    pub fn new(
        storage: Arc<dyn RemoteStorage>,
        splitter: Arc<dyn Splitter>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            storage,
            splitter,
            processes: Arc::new(SystemProcesses),
            watched: DEFAULT_SOURCE_PROCESSES.iter().map(|s| s.to_string()).collect(),
            policy: SizePolicy::default(),
            events,
            sent: SentCounter::new(),
            in_flight: InFlight::new(),
            cancel,
        }
    }

    /// Process list to consult and the names that block a backup
    pub fn with_process_probe(mut self, probe: Arc<dyn ProcessProbe>, watched: Vec<String>) -> Self {
        self.processes = probe;
        self.watched = watched;
        self
    }

    pub fn with_policy(mut self, policy: SizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Counter the remote client feeds, sampled for `upload:speed` events
    pub fn with_sent_counter(mut self, sent: SentCounter) -> Self {
        self.sent = sent;
        self
    }

    pub fn in_flight(&self) -> InFlightView {
        self.in_flight.view()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `job` to a terminal state. Record progress is updated in place.
    pub async fn run(&self, job: &mut BackupJob) -> JobReport {
        info!(
            "Starting backup job {} ({} file(s), {} bytes)",
            job.job_id,
            job.records.len(),
            job.total_bytes()
        );

        let monitor_cancel = self.cancel.child_token();
        let monitor = BandwidthMonitor::spawn(self.sent.clone(), self.events.clone(), monitor_cancel.clone());

        let mut uploads = UploadResult::new();
        let outcome = self.execute(job, &mut uploads).await;

        monitor_cancel.cancel();
        if let Err(e) = monitor.await {
            warn!("Bandwidth monitor ended abnormally: {}", e);
        }
        self.in_flight.clear();
        uploads.finish();

        let (state, error) = match outcome {
            Ok(()) => (JobState::Completed, None),
            Err(e) if e.is_cancelled() => (JobState::Cancelled, None),
            Err(e) => {
                error!("Backup job {} failed while {}: {}", job.job_id, e.phase(), e);
                (JobState::Failed, Some(e))
            }
        };
        self.transition(&job.job_id, state);

        info!(
            "Backup job {} {}: {} artifact(s) uploaded",
            job.job_id,
            state,
            uploads.len()
        );
        self.events.publish(BackupEvent::JobFinished {
            job_id: job.job_id.clone(),
            state,
            uploaded: uploads.len(),
            error: error.as_ref().map(|e| e.to_string()),
        });

        JobReport {
            job_id: job.job_id.clone(),
            state,
            uploads,
            error,
        }
    }

    async fn execute(&self, job: &mut BackupJob, uploads: &mut UploadResult) -> Result<()> {
        self.transition(&job.job_id, JobState::CheckingPreconditions);
        self.checkpoint()?;
        let checks = Preconditions {
            processes: self.processes.as_ref(),
            watched: &self.watched,
        };
        checks.check(self.storage.as_ref(), &job.records).await?;

        self.checkpoint()?;
        self.transition(&job.job_id, JobState::Archiving);
        let plan = self.archive_all(job).await?;

        self.transition(&job.job_id, JobState::Uploading);
        self.upload_all(job, plan, uploads).await
    }

    /// Parts of every record, empty when the record goes up whole.
    async fn archive_all(&self, job: &BackupJob) -> Result<Vec<Vec<FileRecord>>> {
        let mut plan = Vec::with_capacity(job.records.len());

        for record in &job.records {
            self.checkpoint()?;
            if !self.policy.needs_split(record.length) {
                plan.push(Vec::new());
                continue;
            }

            self.in_flight.set(record.id());
            let events = &self.events;
            let mut on_progress = |percent: u8| {
                events.publish(BackupEvent::ArchiveProgress {
                    job_id: job.job_id.clone(),
                    file: record.name.clone(),
                    percent,
                });
            };
            let parts = self.splitter.split(record, &self.cancel, &mut on_progress).await?;
            plan.push(parts);
        }

        self.in_flight.clear();
        Ok(plan)
    }

    async fn upload_all(
        &self,
        job: &mut BackupJob,
        plan: Vec<Vec<FileRecord>>,
        uploads: &mut UploadResult,
    ) -> Result<()> {
        let total_files = job.records.len();
        let job_id = job.job_id.clone();
        let session = UploadSession::new(self.storage.as_ref(), job.settings, &self.cancel);

        for (index, (record, parts)) in job.records.iter_mut().zip(plan).enumerate() {
            self.checkpoint()?;
            if !record.is_unmodified() {
                warn!("{} changed since it was selected", record.name);
            }
            self.in_flight.set(record.id());

            let whole;
            let artifacts: Vec<Artifact<'_>> = if parts.is_empty() {
                whole = record.clone();
                vec![Artifact {
                    record: &whole,
                    position: PartPosition::whole(),
                }]
            } else {
                parts
                    .iter()
                    .enumerate()
                    .map(|(i, part)| Artifact {
                        record: part,
                        position: PartPosition {
                            index: i,
                            count: parts.len(),
                        },
                    })
                    .collect()
            };

            for artifact in artifacts {
                self.checkpoint()?;
                let payload = UploadProgressPayload {
                    job_id: job_id.clone(),
                    file: record.name.clone(),
                    artifact: artifact.record.name.clone(),
                    file_number: index + 1,
                    total_files,
                    part: (!parts.is_empty())
                        .then(|| (artifact.position.index + 1, artifact.position.count)),
                    percent: 0,
                };

                let item = session
                    .upload(artifact.record, |percent| {
                        record.advance_progress(artifact.position.file_fraction(percent));
                        self.events.publish(BackupEvent::UploadProgress(UploadProgressPayload {
                            percent,
                            ..payload.clone()
                        }));
                    })
                    .await?;

                uploads.push(artifact.record.name.clone(), item.id.clone());
                self.events.publish(BackupEvent::UploadItem {
                    job_id: job_id.clone(),
                    name: artifact.record.name.clone(),
                    remote_id: item.id,
                });
            }
        }

        Ok(())
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        Ok(())
    }

    fn transition(&self, job_id: &str, state: JobState) {
        info!("Job {} is {}", job_id, state);
        self.events.publish(BackupEvent::JobState {
            job_id: job_id.to_string(),
            state,
        });
    }
}
