//! Test doubles for the pipeline's collaborators: an in-memory remote
//! drive, a scripted splitter and a fixed process list.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::archive::Splitter;
use crate::fs::FileRecord;
use crate::precheck::ProcessProbe;
use crate::remote::{
    ChunkOutcome, ConflictBehavior, RemoteError, RemoteItem, RemoteStorage, SessionHandle,
};
use crate::transfer::ChunkRange;
use crate::utils::{ArchiveError, BackupError};

/// Every call the pipeline made, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Quota,
    CreateSession { path: String, conflict: ConflictBehavior },
    Chunk { path: String, start: u64, end: u64 },
    Abort { path: String },
    DirectPut { path: String, conflict: ConflictBehavior, len: u64 },
}

struct OpenSession {
    path: String,
    data: Vec<u8>,
    received: u64,
    chunks: usize,
}

#[derive(Default)]
struct State {
    calls: Vec<StorageCall>,
    sessions: HashMap<String, OpenSession>,
    stored: HashMap<String, Vec<u8>>,
    next_id: usize,
    total_chunks: usize,
}

/// Cancel `token` while chunk `chunk` (one-based) is being submitted,
/// either in the session for `path` or counted across all sessions.
struct CancelTrigger {
    path: Option<String>,
    chunk: usize,
    token: CancellationToken,
}

/// A request that is recorded but never answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stall {
    Chunk(usize),
    DirectPut,
}

pub struct MemoryDrive {
    state: Mutex<State>,
    quota: Result<Option<u64>, RemoteError>,
    keep_data: bool,
    fail_chunk: Option<usize>,
    fail_session: bool,
    cancel: Option<CancelTrigger>,
    stall: Option<Stall>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            quota: Ok(Some(u64::MAX)),
            keep_data: true,
            fail_chunk: None,
            fail_session: false,
            cancel: None,
            stall: None,
        }
    }

    pub fn with_quota(mut self, quota: Option<u64>) -> Self {
        self.quota = Ok(quota);
        self
    }

    pub fn failing_quota(mut self) -> Self {
        self.quota = Err(RemoteError::with_status(401, "InvalidAuthenticationToken"));
        self
    }

    /// Don't keep uploaded bytes (for large sparse fixtures)
    pub fn discard_data(mut self) -> Self {
        self.keep_data = false;
        self
    }

    /// Fail the n-th chunk (one-based, counted across sessions)
    pub fn fail_chunk(mut self, chunk: usize) -> Self {
        self.fail_chunk = Some(chunk);
        self
    }

    pub fn fail_session_creation(mut self) -> Self {
        self.fail_session = true;
        self
    }

    pub fn cancel_after_chunks(mut self, chunk: usize, token: CancellationToken) -> Self {
        self.cancel = Some(CancelTrigger {
            path: None,
            chunk,
            token,
        });
        self
    }

    pub fn cancel_during(mut self, path: &str, chunk: usize, token: CancellationToken) -> Self {
        self.cancel = Some(CancelTrigger {
            path: Some(path.to_string()),
            chunk,
            token,
        });
        self
    }

    /// Leave the n-th chunk (one-based, counted across sessions) pending
    /// forever, as a request still on the wire.
    pub fn stall_on_chunk(mut self, chunk: usize) -> Self {
        self.stall = Some(Stall::Chunk(chunk));
        self
    }

    pub fn stall_direct_put(mut self) -> Self {
        self.stall = Some(Stall::DirectPut);
        self
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn chunk_ranges(&self) -> Vec<(u64, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StorageCall::Chunk { start, end, .. } => Some((start, end)),
                _ => None,
            })
            .collect()
    }

    pub fn chunks_for(&self, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StorageCall::Chunk { path: p, .. } if p == path))
            .count()
    }

    pub fn abort_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StorageCall::Abort { .. }))
            .count()
    }

    /// Content of a completed upload
    pub fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().stored.get(path).cloned()
    }

    fn item_for(state: &mut State, path: &str) -> RemoteItem {
        state.next_id += 1;
        RemoteItem {
            id: format!("item-{}", state.next_id),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
        }
    }
}

#[async_trait]
impl RemoteStorage for MemoryDrive {
    async fn quota_remaining(&self) -> Result<Option<u64>, RemoteError> {
        self.state.lock().unwrap().calls.push(StorageCall::Quota);
        self.quota.clone()
    }

    async fn create_upload_session(
        &self,
        path: &str,
        conflict: ConflictBehavior,
    ) -> Result<SessionHandle, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StorageCall::CreateSession {
            path: path.to_string(),
            conflict,
        });
        if self.fail_session {
            return Err(RemoteError::with_status(507, "insufficientStorage"));
        }

        let handle = format!("session-{}", state.sessions.len() + state.stored.len() + state.calls.len());
        state.sessions.insert(
            handle.clone(),
            OpenSession {
                path: path.to_string(),
                data: Vec::new(),
                received: 0,
                chunks: 0,
            },
        );
        Ok(SessionHandle(handle))
    }

    async fn submit_chunk(
        &self,
        session: &SessionHandle,
        range: ChunkRange,
        total: u64,
        data: Bytes,
    ) -> Result<ChunkOutcome, RemoteError> {
        let stalled = {
            let mut state = self.state.lock().unwrap();
            let next = state.total_chunks + 1;
            if self.stall == Some(Stall::Chunk(next)) {
                state.total_chunks = next;
                let path = state
                    .sessions
                    .get(&session.0)
                    .map(|open| open.path.clone())
                    .unwrap_or_default();
                state.calls.push(StorageCall::Chunk {
                    path,
                    start: range.start,
                    end: range.end,
                });
                true
            } else {
                false
            }
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        state.total_chunks += 1;
        let global_chunk = state.total_chunks;

        let open = state
            .sessions
            .get_mut(&session.0)
            .ok_or_else(|| RemoteError::with_status(404, "itemNotFound"))?;
        open.chunks += 1;
        let session_chunk = open.chunks;
        let path = open.path.clone();

        if range.start != open.received || range.len() != data.len() as u64 {
            return Err(RemoteError::with_status(416, "invalidRange"));
        }
        open.received = range.end;
        if self.keep_data {
            open.data.extend_from_slice(&data);
        }

        state.calls.push(StorageCall::Chunk {
            path: path.clone(),
            start: range.start,
            end: range.end,
        });

        if let Some(trigger) = &self.cancel {
            let hit = match &trigger.path {
                Some(p) => *p == path && session_chunk == trigger.chunk,
                None => global_chunk == trigger.chunk,
            };
            if hit {
                trigger.token.cancel();
            }
        }

        if self.fail_chunk == Some(global_chunk) {
            return Err(RemoteError::with_status(500, "generalException"));
        }

        if range.end < total {
            return Ok(ChunkOutcome::Accepted);
        }

        let Some(open) = state.sessions.remove(&session.0) else {
            return Err(RemoteError::with_status(404, "itemNotFound"));
        };
        state.stored.insert(path.clone(), open.data);
        Ok(ChunkOutcome::Completed(Self::item_for(&mut state, &path)))
    }

    async fn abort_session(&self, session: &SessionHandle) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        let path = state
            .sessions
            .remove(&session.0)
            .map(|open| open.path)
            .unwrap_or_default();
        state.calls.push(StorageCall::Abort { path });
        Ok(())
    }

    async fn direct_put(
        &self,
        path: &str,
        conflict: ConflictBehavior,
        data: Bytes,
    ) -> Result<RemoteItem, RemoteError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(StorageCall::DirectPut {
                path: path.to_string(),
                conflict,
                len: data.len() as u64,
            });
        }
        if self.stall == Some(Stall::DirectPut) {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        let content = if self.keep_data { data.to_vec() } else { Vec::new() };
        state.stored.insert(path.to_string(), content);
        Ok(Self::item_for(&mut state, path))
    }
}

/// Splits every file into `parts` fragments of `part_len` bytes written to
/// `dir`, without running a compressor.
pub struct FakeSplitter {
    dir: PathBuf,
    parts: usize,
    part_len: usize,
    fail: bool,
    split: Mutex<Vec<String>>,
}

impl FakeSplitter {
    pub fn new(dir: impl Into<PathBuf>, parts: usize, part_len: usize) -> Self {
        Self {
            dir: dir.into(),
            parts,
            part_len,
            fail: false,
            split: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Names of the files split so far
    pub fn split_names(&self) -> Vec<String> {
        self.split.lock().unwrap().clone()
    }
}

#[async_trait]
impl Splitter for FakeSplitter {
    async fn split(
        &self,
        record: &FileRecord,
        cancel: &CancellationToken,
        progress: &mut (dyn FnMut(u8) + Send),
    ) -> crate::utils::Result<Vec<FileRecord>> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        self.split.lock().unwrap().push(record.name.clone());
        if self.fail {
            return Err(BackupError::Archive {
                file: record.name.clone(),
                source: ArchiveError::ProcessFailed {
                    code: Some(2),
                    stderr: "ERROR: disk full".to_string(),
                },
            });
        }

        let mut parts = Vec::new();
        for index in 1..=self.parts {
            let name = format!("{}.7z.{:03}", record.name, index);
            let path = self.dir.join(&name);
            std::fs::write(&path, vec![index as u8; self.part_len])?;
            parts.push(FileRecord::new(name, path, record.destination.clone(), self.part_len as u64));
            progress(crate::transfer::progress::chunk_percent(index, self.parts));
        }
        Ok(parts)
    }
}

/// Fixed list of running processes
pub struct FixedProcesses(Result<Vec<String>, String>);

impl FixedProcesses {
    pub fn new(names: &[&str]) -> Self {
        Self(Ok(names.iter().map(|n| n.to_string()).collect()))
    }

    pub fn failing() -> Self {
        Self(Err("access denied".to_string()))
    }
}

impl ProcessProbe for FixedProcesses {
    fn process_names(&self) -> Result<Vec<String>, String> {
        self.0.clone()
    }
}
