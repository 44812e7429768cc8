//! Checks that run before anything is archived or uploaded.

use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info};

use crate::fs::FileRecord;
use crate::remote::RemoteStorage;
use crate::transfer::progress::format_bytes;
use crate::utils::PreconditionError;

/// Default mail client whose data files must not be open
pub const DEFAULT_SOURCE_PROCESSES: &[&str] = &["OUTLOOK"];

/// Lists the names of running processes.
pub trait ProcessProbe: Send + Sync {
    fn process_names(&self) -> Result<Vec<String>, String>;
}

/// Process list of the local machine
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl ProcessProbe for SystemProcesses {
    fn process_names(&self) -> Result<Vec<String>, String> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(system
            .processes()
            .values()
            .map(|process| process.name().to_string_lossy().to_string())
            .collect())
    }
}

/// `OUTLOOK.EXE`, `outlook` and `Outlook.exe` all name the same program.
fn normalize(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// First of `watched` found among the running processes
pub fn find_running(probe: &dyn ProcessProbe, watched: &[String]) -> Result<Option<String>, PreconditionError> {
    if watched.is_empty() {
        return Ok(None);
    }

    let running: Vec<String> = probe
        .process_names()
        .map_err(PreconditionError::ProcessProbe)?
        .iter()
        .map(|name| normalize(name))
        .collect();

    Ok(watched
        .iter()
        .find(|name| running.contains(&normalize(name)))
        .cloned())
}

/// The remote must report more remaining space than the job needs.
pub async fn check_quota(storage: &dyn RemoteStorage, required: u64) -> Result<u64, PreconditionError> {
    let remaining = storage
        .quota_remaining()
        .await
        .map_err(PreconditionError::QuotaQuery)?
        .ok_or(PreconditionError::QuotaUnavailable)?;

    debug!("Remote quota: {} remaining, {} required", format_bytes(remaining), format_bytes(required));
    if required >= remaining {
        return Err(PreconditionError::InsufficientQuota { required, remaining });
    }
    Ok(remaining)
}

/// Source application and quota checks for one job.
pub struct Preconditions<'a> {
    pub processes: &'a dyn ProcessProbe,
    pub watched: &'a [String],
}

impl Preconditions<'_> {
    pub async fn check(&self, storage: &dyn RemoteStorage, records: &[FileRecord]) -> Result<(), PreconditionError> {
        if let Some(name) = find_running(self.processes, self.watched)? {
            return Err(PreconditionError::SourceAppRunning(name));
        }

        let required: u64 = records.iter().map(|r| r.length).sum();
        let remaining = check_quota(storage, required).await?;
        info!(
            "Preconditions met: {} to back up, {} available remotely",
            format_bytes(required),
            format_bytes(remaining)
        );
        Ok(())
    }
}
