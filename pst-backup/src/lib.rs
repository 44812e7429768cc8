//! Mailbox Backup Library
//!
//! Backs up Outlook data files to OneDrive: oversized files are split into
//! 7-Zip volumes, every file or volume is uploaded through a resumable
//! session, and the whole job can be cancelled at any point.

pub mod archive;
pub mod config;
pub mod events;
pub mod executor;
pub mod fs;
pub mod policy;
pub mod precheck;
pub mod remote;
pub mod shutdown;
pub mod transfer;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupJob, BackupOrchestrator, JobReport, JobState};
pub use utils::errors::{BackupError, Result};
