//! Split decision for oversized mailbox files.

/// Largest file the remote accepts as a single item (10 GiB).
pub const SPLIT_THRESHOLD: u64 = 10 * 1024 * 1024 * 1024;

/// Decides whether a file has to go through the archiver before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    threshold: u64,
}

impl SizePolicy {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// True iff `length` strictly exceeds the threshold.
    pub fn needs_split(&self, length: u64) -> bool {
        length > self.threshold
    }
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::new(SPLIT_THRESHOLD)
    }
}

/// Split decision with the default 10 GiB threshold.
pub fn needs_split(length: u64) -> bool {
    SizePolicy::default().needs_split(length)
}
