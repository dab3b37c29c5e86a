//! Native per-directory subscriptions used as early-tick hints.
//!
//! Each directory seen by the last walk gets one non-recursive native
//! subscription. The set grows and shrinks with the walk's directory set,
//! and is only touched by the session worker.

use crate::WatchError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Outcome of one [`DirectoryRegistry::sync`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub subscribed: usize,
    pub released: usize,
    pub failed: usize,
}

/// Registry of native directory subscriptions keyed by path.
pub struct DirectoryRegistry {
    watcher: RecommendedWatcher,
    subscriptions: HashSet<PathBuf>,
}

impl DirectoryRegistry {
    /// Create an empty registry; every native event wakes `wake`.
    pub fn new(wake: Arc<Notify>) -> Result<Self, WatchError> {
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) if is_relevant(&event) => wake.notify_one(),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Native watcher error"),
            }
        })?;

        Ok(Self {
            watcher,
            subscriptions: HashSet::new(),
        })
    }

    /// Subscribe new directories and release those no longer present.
    pub fn sync(&mut self, dirs: &HashSet<PathBuf>) -> SyncSummary {
        let mut summary = SyncSummary::default();

        let stale: Vec<PathBuf> = self.subscriptions.difference(dirs).cloned().collect();
        for dir in stale {
            if let Err(e) = self.watcher.unwatch(&dir) {
                // Removing a directory usually drops its native watch already
                debug!(path = ?dir, error = %e, "Unsubscribe failed");
            }
            self.subscriptions.remove(&dir);
            summary.released += 1;
        }

        for dir in dirs.difference(&self.subscriptions).cloned().collect::<Vec<_>>() {
            match self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.subscriptions.insert(dir);
                    summary.subscribed += 1;
                }
                Err(e) => {
                    warn!(path = ?dir, error = %e, "Subscribe failed, relying on polling");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    pub fn is_subscribed(&self, dir: &Path) -> bool {
        self.subscriptions.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_) | EventKind::Other)
}
