//! Discovery of Outlook data files in a directory tree.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions of Outlook data files (personal folders and offline cache)
pub const MAILBOX_EXTENSIONS: &[&str] = &["pst", "ost"];

/// Options for mailbox discovery
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Maximum depth (None = unlimited)
    pub max_depth: Option<usize>,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
        }
    }
}

/// Whether `path` names an Outlook data file (case-insensitive extension).
pub fn is_mailbox_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            MAILBOX_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Walk `root` and return every `.pst` / `.ost` file, sorted by path.
///
/// # Example
/// ```no_run
/// use pst_backup::fs::walker::{discover_mailboxes, DiscoverOptions};
/// use std::path::Path;
///
/// let files = discover_mailboxes(Path::new("/home/me/Documents/Outlook Files"), DiscoverOptions::default()).unwrap();
/// println!("Found {} mailbox files", files.len());
/// ```
pub fn discover_mailboxes(root: &Path, options: DiscoverOptions) -> std::io::Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).follow_links(options.follow_links);

    if let Some(max_depth) = options.max_depth {
        walker = walker.max_depth(max_depth);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;

        if !is_regular_file(&entry) {
            continue;
        }

        if is_mailbox_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
}
