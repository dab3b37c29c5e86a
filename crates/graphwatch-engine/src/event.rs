//! Change events and the sink they are delivered to.

use crate::snapshot::FileRecord;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use tokio::sync::mpsc;

/// Kind of change reported for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
        };
        f.write_str(name)
    }
}

/// Subset of file metadata carried by add/change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileStat {
    /// Milliseconds since the Unix epoch
    pub mtime: i64,
    /// Milliseconds since the Unix epoch
    pub ctime: i64,
    pub size: u64,
}

impl From<&FileRecord> for FileStat {
    fn from(record: &FileRecord) -> Self {
        Self {
            mtime: record.mtime_ms(),
            ctime: record.ctime_ms(),
            size: record.size,
        }
    }
}

/// A normalized change to one file under the session root.
///
/// Serializes to `{path, dir, event, stat, content}`; `stat` and `content`
/// are omitted for unlinks, and `content` is `null` when not loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Root-relative, forward slashes, NFC
    pub path: String,
    /// Session root as a `file://` URI
    pub dir: String,
    pub stat: Option<FileStat>,
    pub content: Option<String>,
}

impl ChangeEvent {
    pub fn upsert(
        kind: ChangeKind,
        path: String,
        dir: String,
        record: &FileRecord,
        content: Option<String>,
    ) -> Self {
        Self {
            kind,
            path,
            dir,
            stat: Some(FileStat::from(record)),
            content,
        }
    }

    pub fn unlink(path: String, dir: String) -> Self {
        Self {
            kind: ChangeKind::Unlink,
            path,
            dir,
            stat: None,
            content: None,
        }
    }
}

impl Serialize for ChangeEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let with_body = self.kind != ChangeKind::Unlink;
        let len = if with_body { 5 } else { 3 };

        let mut state = serializer.serialize_struct("ChangeEvent", len)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("dir", &self.dir)?;
        state.serialize_field("event", &self.kind)?;
        if with_body {
            state.serialize_field("stat", &self.stat)?;
            state.serialize_field("content", &self.content)?;
        }
        state.end()
    }
}

/// Receiver of a session's events. One sink is injected per watcher.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: ChangeEvent);
}

impl EventSink for mpsc::UnboundedSender<ChangeEvent> {
    fn deliver(&self, event: ChangeEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.send(event);
    }
}
