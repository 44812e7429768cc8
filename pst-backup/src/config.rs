//! Configuration management for the backup tool.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`PST_BACKUP__UPLOAD__CHUNK_SIZE=10485760`). Every key has a default, so
//! the file is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::archive::{SplitSize, DEFAULT_COMPRESSOR};
use crate::fs::record::validate_destination;
use crate::precheck::DEFAULT_SOURCE_PROCESSES;
use crate::remote::graph::GRAPH_URL;
use crate::remote::ConflictBehavior;
use crate::transfer::chunk::DEFAULT_CHUNK_SIZE;
use crate::transfer::session::DEFAULT_DIRECT_UPLOAD_LIMIT;
use crate::transfer::UploadSettings;
use crate::utils::{BackupError, Result};

/// Prefix of environment overrides
const ENV_PREFIX: &str = "PST_BACKUP";

/// Graph recommends upload chunks in multiples of 320 KiB
const CHUNK_ALIGNMENT: u64 = 320 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub upload: UploadConfig,
    pub archive: ArchiveConfig,
    pub precondition: PreconditionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Microsoft Graph base URL
    pub graph_url: String,

    /// Environment variable holding the bearer token
    pub token_env: String,

    /// Remote folder receiving the backups
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Chunk size in bytes (default: 5MB)
    pub chunk_size: u64,

    /// Largest file sent in a single request (default: 10MB)
    pub direct_upload_limit: u64,

    /// replace or rename
    pub conflict: ConflictBehavior,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// 7-Zip executable (path or name on PATH)
    pub compressor: PathBuf,

    /// Volume size (e.g. "2g", "500 MiB")
    pub split_size: SplitSize,

    /// Where archive volumes are written
    pub staging_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreconditionConfig {
    /// Processes that must not be running during a backup
    pub source_processes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            graph_url: GRAPH_URL.to_string(),
            token_env: "PST_BACKUP_TOKEN".to_string(),
            destination: "/Backup".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            direct_upload_limit: DEFAULT_DIRECT_UPLOAD_LIMIT,
            conflict: ConflictBehavior::default(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compressor: PathBuf::from(DEFAULT_COMPRESSOR),
            split_size: SplitSize::default(),
            staging_dir: std::env::temp_dir().join("pst-backup"),
        }
    }
}

impl Default for PreconditionConfig {
    fn default() -> Self {
        Self {
            source_processes: DEFAULT_SOURCE_PROCESSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Defaults, optionally a TOML file, then environment overrides. Values
    /// are not checked until `validate`, so command line overrides can still
    /// replace them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("precondition.source_processes")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BackupError::Config(e.to_string()))
    }

    /// Apply command line overrides on top of the loaded values
    pub fn with_overrides(mut self, destination: Option<String>, conflict: Option<ConflictBehavior>) -> Self {
        if let Some(destination) = destination {
            self.remote.destination = destination;
        }
        if let Some(conflict) = conflict {
            self.upload.conflict = conflict;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload.chunk_size == 0 {
            return Err(BackupError::Config("upload.chunk_size must be greater than zero".to_string()));
        }
        if self.upload.chunk_size % CHUNK_ALIGNMENT != 0 {
            warn!(
                "upload.chunk_size {} is not a multiple of 320 KiB, the remote may reject chunks",
                self.upload.chunk_size
            );
        }
        validate_destination(&self.remote.destination)?;
        if self.archive.compressor.as_os_str().is_empty() {
            return Err(BackupError::Config("archive.compressor must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn upload_settings(&self) -> UploadSettings {
        UploadSettings {
            chunk_size: self.upload.chunk_size,
            direct_upload_limit: self.upload.direct_upload_limit,
            conflict: self.upload.conflict,
        }
    }

    /// Bearer token from the configured environment variable
    pub fn token(&self) -> Result<String> {
        std::env::var(&self.remote.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                BackupError::Config(format!(
                    "no access token: set {} to a Microsoft Graph bearer token",
                    self.remote.token_env
                ))
            })
    }
}
