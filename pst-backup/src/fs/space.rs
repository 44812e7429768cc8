//! Free space of the volume holding the staging directory.

use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Free space on a local volume.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to the current user on the volume containing `path`,
    /// or None when the volume can't be determined.
    fn available_space(&self, path: &Path) -> Option<u64>;
}

/// Disk probe backed by the system disk list.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDisks;

impl SpaceProbe for SystemDisks {
    fn available_space(&self, path: &Path) -> Option<u64> {
        let path = resolve(path);
        let disks = Disks::new_with_refreshed_list();

        // Nested mounts: the longest matching mount point owns the path.
        disks
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Canonicalize the nearest existing ancestor so that symlinked temp
/// directories resolve to their real volume.
fn resolve(path: &Path) -> PathBuf {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if let Ok(real) = candidate.canonicalize() {
            return real;
        }
        current = candidate.parent();
    }
    path.to_path_buf()
}

/// Fixed answer, for callers that already know the free space.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpace(pub Option<u64>);

impl SpaceProbe for FixedSpace {
    fn available_space(&self, _path: &Path) -> Option<u64> {
        self.0
    }
}
