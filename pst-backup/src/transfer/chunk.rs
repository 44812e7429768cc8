//! Byte ranges of a resumable upload.

use serde::{Deserialize, Serialize};

/// Default upload chunk (5 MiB, a multiple of the 320 KiB Graph granularity)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Half-open byte range `[start, end)` of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Inclusive last byte, as used by `Content-Range`.
    pub fn last_byte(&self) -> u64 {
        self.end.saturating_sub(1)
    }
}

/// Ordered ranges covering `[0, length)` in `chunk_size` steps. The last
/// range holds the remainder. A zero-length file has no ranges.
///
/// # Panics
/// Panics if `chunk_size` is zero. `UploadSession::upload` refuses that
/// setting before planning.
pub fn plan_chunks(length: u64, chunk_size: u64) -> Vec<ChunkRange> {
    assert!(chunk_size > 0, "chunk size must be positive");

    let count = length.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            ChunkRange {
                start,
                end: (start + chunk_size).min(length),
            }
        })
        .collect()
}
