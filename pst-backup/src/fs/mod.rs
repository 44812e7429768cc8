//! Local filesystem: mailbox records, discovery, integrity and free space.

pub mod metadata;
pub mod record;
pub mod space;
pub mod walker;

pub use record::{FileRecord, RecordId};
