//! Backup jobs and the list of files waiting to be backed up.

use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use super::in_flight::InFlightView;
use crate::fs::{FileRecord, RecordId};
use crate::transfer::UploadSettings;

/// One run of the pipeline over an ordered set of files
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub job_id: String,
    pub records: Vec<FileRecord>,
    pub settings: UploadSettings,
}

impl BackupJob {
    pub fn new(records: Vec<FileRecord>, settings: UploadSettings) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            records,
            settings,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.length).sum()
    }
}

/// Files selected for backup, in selection order.
#[derive(Debug, Default)]
pub struct PendingList {
    records: Vec<FileRecord>,
}

impl PendingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` unless a record for the same local path is listed.
    pub fn add(&mut self, record: FileRecord) -> bool {
        if self.contains_path(&record.path) {
            debug!("{} is already listed", record.path.display());
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.records.iter().any(|r| r.path == path)
    }

    /// Remove the records named by `ids`, except the one in flight. Returns
    /// the ids actually removed.
    pub fn remove(&mut self, ids: &[RecordId], in_flight: &InFlightView) -> Vec<RecordId> {
        let mut removed = Vec::new();
        self.records.retain(|record| {
            let id = record.id();
            if !ids.contains(&id) {
                return true;
            }
            if in_flight.is_in_flight(id) {
                info!("Keeping {}: it is being backed up", record.name);
                return true;
            }
            removed.push(id);
            false
        });
        removed
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Job over a snapshot of the current list
    pub fn to_job(&self, settings: UploadSettings) -> BackupJob {
        BackupJob::new(self.records.clone(), settings)
    }
}
