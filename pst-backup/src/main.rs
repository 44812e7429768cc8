//! pst-backup - Main entry point
//!
//! Backs up the given mailbox files to OneDrive and prints the id of every
//! uploaded file or volume.

use anyhow::{bail, Result};
use clap::Parser;
use pst_backup::archive::Archiver;
use pst_backup::events::{BackupEvent, EventBus};
use pst_backup::executor::PendingList;
use pst_backup::fs::walker::{discover_mailboxes, is_mailbox_file, DiscoverOptions};
use pst_backup::fs::FileRecord;
use pst_backup::precheck::SystemProcesses;
use pst_backup::remote::graph::GraphDrive;
use pst_backup::remote::ConflictBehavior;
use pst_backup::shutdown::ShutdownCoordinator;
use pst_backup::transfer::SentCounter;
use pst_backup::{utils, BackupOrchestrator, Config, JobState};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exit code of a cancelled run (as after SIGINT)
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Remote folder (overrides config), e.g. /Backup/Mail
    #[arg(short, long)]
    destination: Option<String>,

    /// What to do when the remote name exists: replace or rename
    #[arg(long)]
    conflict: Option<ConflictBehavior>,

    /// Also back up every .pst/.ost file found under DIR
    #[arg(long, value_name = "DIR")]
    discover: Option<PathBuf>,

    /// Print events and the final report as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Mailbox files to back up
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?.with_overrides(args.destination.clone(), args.conflict);

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    config.validate()?;

    info!("Starting pst-backup v{}", env!("CARGO_PKG_VERSION"));

    let pending = collect_files(&args, &config)?;
    if pending.is_empty() {
        bail!("no files to back up");
    }

    let token = config.token()?;
    let sent = SentCounter::new();
    let storage = Arc::new(GraphDrive::new(config.remote.graph_url.clone(), token, sent.clone()));
    let archiver = Arc::new(Archiver::new(
        config.archive.compressor.clone(),
        config.archive.staging_dir.clone(),
        config.archive.split_size,
    ));

    let events = EventBus::new();
    let printer = spawn_printer(events.subscribe(), args.json);

    // Ctrl+C / SIGTERM cancel the job
    let cancel = CancellationToken::new();
    let signals = ShutdownCoordinator::new(cancel.clone()).spawn();

    let orchestrator = BackupOrchestrator::new(storage, archiver, events, cancel.clone())
        .with_process_probe(Arc::new(SystemProcesses), config.precondition.source_processes.clone())
        .with_sent_counter(sent);

    let mut job = pending.to_job(config.upload_settings());
    let report = orchestrator.run(&mut job).await;

    // Release the signal listener and close the event channel
    cancel.cancel();
    drop(orchestrator);
    if let Err(e) = signals.await {
        warn!("Signal listener ended abnormally: {}", e);
    }
    if let Err(e) = printer.await {
        warn!("Event printer ended abnormally: {}", e);
    }

    if args.json {
        let summary = serde_json::json!({
            "job_id": report.job_id,
            "state": report.state,
            "uploads": report.uploads,
            "error": report.error.as_ref().map(|e| e.to_string()),
        });
        println!("{}", summary);
    } else {
        for line in report.uploads.lines() {
            println!("{}", line);
        }
    }

    Ok(match report.state {
        JobState::Completed => ExitCode::SUCCESS,
        JobState::Cancelled => {
            warn!("Backup cancelled after {} upload(s)", report.uploads.len());
            ExitCode::from(EXIT_CANCELLED)
        }
        _ => {
            if let Some(e) = &report.error {
                error!("Backup failed: {}", e);
            }
            ExitCode::FAILURE
        }
    })
}

/// Files from the command line and the discovery directory, in that order.
fn collect_files(args: &Args, config: &Config) -> Result<PendingList> {
    let mut paths = args.files.clone();
    if let Some(dir) = &args.discover {
        let found = discover_mailboxes(dir, DiscoverOptions::default())?;
        info!("Found {} mailbox file(s) in {}", found.len(), dir.display());
        paths.extend(found);
    }

    let mut pending = PendingList::new();
    for path in paths {
        if !is_mailbox_file(&path) {
            warn!("{} is not a .pst or .ost file, backing it up anyway", path.display());
        }
        let record = FileRecord::from_path(&path, &config.remote.destination)?;
        if !pending.add(record) {
            warn!("{} listed twice, backing it up once", path.display());
        }
    }
    Ok(pending)
}

fn spawn_printer(mut rx: broadcast::Receiver<BackupEvent>, json: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if json => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize event: {}", e),
                },
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &BackupEvent) {
    match event {
        BackupEvent::ArchiveProgress { file, percent, .. } => {
            debug!("Archiving {}: {}%", file, percent)
        }
        BackupEvent::UploadProgress(p) => match p.part {
            Some((part, parts)) => debug!(
                "Uploading {} ({}/{}), part {}/{}: {}%",
                p.file, p.file_number, p.total_files, part, parts, p.percent
            ),
            None => debug!(
                "Uploading {} ({}/{}): {}%",
                p.file, p.file_number, p.total_files, p.percent
            ),
        },
        BackupEvent::UploadItem { name, remote_id, .. } => info!("Uploaded {} - {}", name, remote_id),
        BackupEvent::UploadSpeed { speed, .. } => debug!("Upload speed: {}", speed),
        BackupEvent::JobState { .. } | BackupEvent::JobFinished { .. } => {}
    }
}
