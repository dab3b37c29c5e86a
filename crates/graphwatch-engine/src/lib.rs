//! Graphwatch Engine
//!
//! Change detection for a directory tree without relying on native file
//! notifications, which are unreliable on synced and network mounts:
//! - Recursive walk with directory exclusions and reserved file names
//! - Metadata snapshots diffed by (mtime, ctime, size, inode)
//! - Add/change events with optional text content
//! - Debounced, re-validated deletions through a single delay queue
//! - Optional native directory hints for earlier ticks

pub mod content;
pub mod diff;
pub mod emitter;
mod error;
pub mod event;
pub mod metrics;
pub mod options;
pub mod path;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod walker;

pub use content::ContentLoader;
pub use diff::{diff, SnapshotDiff};
pub use error::WatchError;
pub use event::{ChangeEvent, ChangeKind, EventSink, FileStat};
pub use metrics::{MetricsSnapshot, WatchMetrics};
pub use options::{Strategy, WatchOptions};
pub use path::{resolve_root, root_uri};
pub use registry::DirectoryRegistry;
pub use session::{SessionState, Watcher};
pub use snapshot::{FileRecord, Snapshot, SnapshotEntry};
pub use walker::{WalkReport, WalkRules, Walker};
