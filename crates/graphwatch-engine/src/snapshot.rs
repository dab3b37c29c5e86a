//! Metadata snapshots of a watched tree.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata captured for one file by a single stat call.
///
/// Two records are equivalent iff all four fields are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileRecord {
    /// Last content modification, nanoseconds since the Unix epoch
    pub modified_ns: i128,
    /// Last status change (creation time where ctime is unavailable)
    pub changed_ns: i128,
    /// File size in bytes
    pub size: u64,
    /// Inode number, or 0 where the platform has no stable file id
    pub file_id: u64,
}

impl FileRecord {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            modified_ns: metadata.modified().map(system_time_ns).unwrap_or(0),
            changed_ns: changed_ns(metadata),
            size: metadata.len(),
            file_id: file_id(metadata),
        }
    }

    /// Modification time in milliseconds since the Unix epoch.
    pub fn mtime_ms(&self) -> i64 {
        (self.modified_ns / 1_000_000) as i64
    }

    /// Change time in milliseconds since the Unix epoch.
    pub fn ctime_ms(&self) -> i64 {
        (self.changed_ns / 1_000_000) as i64
    }
}

fn system_time_ns(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    }
}

#[cfg(unix)]
fn changed_ns(metadata: &Metadata) -> i128 {
    use std::os::unix::fs::MetadataExt;
    metadata.ctime() as i128 * 1_000_000_000 + metadata.ctime_nsec() as i128
}

#[cfg(not(unix))]
fn changed_ns(metadata: &Metadata) -> i128 {
    metadata.created().map(system_time_ns).unwrap_or(0)
}

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn file_id(_metadata: &Metadata) -> u64 {
    0
}

/// A file as seen by one walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// On-disk path, used for content reads and existence checks
    pub path: PathBuf,
    /// Metadata at walk time
    pub record: FileRecord,
}

/// Immutable result of one walk: normalized relative key to entry.
///
/// Built fresh on every tick and replaced wholesale, never patched.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: HashMap<String, SnapshotEntry>,
    dirs: HashSet<PathBuf>,
}

impl Snapshot {
    pub fn new(files: HashMap<String, SnapshotEntry>, dirs: HashSet<PathBuf>) -> Self {
        Self { files, dirs }
    }

    pub fn get(&self, key: &str) -> Option<&SnapshotEntry> {
        self.files.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotEntry)> {
        self.files.iter()
    }

    /// Directories visited by the walk, root included.
    pub fn dirs(&self) -> &HashSet<PathBuf> {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
