//! Tree walker producing metadata snapshots.

use crate::path::relative_key;
use crate::snapshot::{FileRecord, Snapshot, SnapshotEntry};
use crate::{WatchError, WatchOptions};
use ignore::WalkBuilder;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Exclusion rules applied during a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkRules {
    excluded_dirs: Arc<HashSet<String>>,
    reserved_files: HashSet<String>,
    follow_links: bool,
}

impl WalkRules {
    pub fn new(
        excluded_dirs: impl IntoIterator<Item = String>,
        reserved_files: impl IntoIterator<Item = String>,
        follow_links: bool,
    ) -> Self {
        Self {
            excluded_dirs: Arc::new(excluded_dirs.into_iter().collect()),
            reserved_files: reserved_files.into_iter().collect(),
            follow_links,
        }
    }

    pub fn from_options(options: &WatchOptions) -> Self {
        Self::new(
            options.excluded_dirs.iter().cloned(),
            options.reserved_files.iter().cloned(),
            options.follow_links,
        )
    }

    /// Whether a directory with this name is skipped along with its contents.
    pub fn is_excluded_dir(&self, name: &OsStr) -> bool {
        excluded_dir(&self.excluded_dirs, name)
    }

    /// Whether a file with this name is internal bookkeeping.
    pub fn is_reserved_file(&self, name: &OsStr) -> bool {
        name.to_str()
            .map_or(false, |n| self.reserved_files.contains(n))
    }
}

fn excluded_dir(excluded: &HashSet<String>, name: &OsStr) -> bool {
    is_hidden(name) || excluded.contains(name.to_string_lossy().as_ref())
}

/// Dot-prefixed names: `.DS_Store`, iCloud placeholders, editor swap files.
fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// A listing failure on the root itself means nothing was seen at all.
fn is_root_failure(err: &ignore::Error) -> bool {
    err.depth() == Some(0)
}

fn root_walk_error(err: ignore::Error) -> WatchError {
    let message = err.to_string();
    match err.into_io_error() {
        Some(io) => WatchError::Io(io),
        None => WatchError::Io(std::io::Error::new(std::io::ErrorKind::Other, message)),
    }
}

/// Result of one walk.
#[derive(Debug)]
pub struct WalkReport {
    pub snapshot: Snapshot,
    /// Entries skipped because they could not be read or stat'd
    pub errors: usize,
}

/// Recursive walker over a watch root.
pub struct Walker {
    root: PathBuf,
    rules: WalkRules,
}

impl Walker {
    /// Create a new walker for the given canonical root directory.
    pub fn new(root: &Path, rules: WalkRules) -> Self {
        Self {
            root: root.to_path_buf(),
            rules,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and capture metadata for every eligible regular file.
    ///
    /// Fails only when the root itself cannot be stat'd or listed. Files
    /// that vanish or cannot be stat'd mid-walk are left out of the snapshot.
    pub fn walk(&self) -> Result<WalkReport, WatchError> {
        let root_meta = std::fs::metadata(&self.root)?;
        if !root_meta.is_dir() {
            return Err(WatchError::InvalidPath(self.root.display().to_string()));
        }

        let excluded = self.rules.excluded_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(self.rules.follow_links)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |ft| ft.is_dir());
                !(is_dir && entry.depth() > 0 && excluded_dir(&excluded, entry.file_name()))
            })
            .build();

        let mut files = HashMap::new();
        let mut dirs = HashSet::new();
        let mut errors = 0;

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) if is_root_failure(&e) => {
                    debug!(root = ?self.root, error = %e, "Root listing failed");
                    return Err(root_walk_error(e));
                }
                Err(e) => {
                    debug!(error = %e, "Walk error");
                    errors += 1;
                    continue;
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                dirs.insert(entry.path().to_path_buf());
                continue;
            }

            if !file_type.is_file()
                || is_hidden(entry.file_name())
                || self.rules.is_reserved_file(entry.file_name())
            {
                continue;
            }

            let Some(key) = relative_key(&self.root, entry.path()) else {
                continue;
            };

            // One stat per file; a failure means the file is skipped this tick
            let metadata = match std::fs::metadata(entry.path()) {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    debug!(path = ?entry.path(), error = %e, "Stat failed, skipping");
                    errors += 1;
                    continue;
                }
            };

            files.insert(
                key,
                SnapshotEntry {
                    path: entry.path().to_path_buf(),
                    record: FileRecord::from_metadata(&metadata),
                },
            );
        }

        Ok(WalkReport {
            snapshot: Snapshot::new(files, dirs),
            errors,
        })
    }
}
