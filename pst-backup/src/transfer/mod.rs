//! Upload side of the pipeline: chunk planning, upload sessions and
//! throughput accounting.

pub mod bandwidth;
pub mod chunk;
pub mod progress;
pub mod progress_stream;
pub mod session;

pub use bandwidth::{BandwidthMonitor, SentCounter};
pub use chunk::{plan_chunks, ChunkRange};
pub use session::{UploadSession, UploadSettings};
