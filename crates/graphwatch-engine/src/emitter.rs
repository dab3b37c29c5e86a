//! Turns classified snapshot entries into delivered events.

use crate::content::ContentLoader;
use crate::event::{ChangeEvent, ChangeKind, EventSink};
use crate::metrics::WatchMetrics;
use crate::snapshot::SnapshotEntry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Event emitter bound to one session.
///
/// Delivery stops as soon as the session is cancelled, so work still in
/// flight when `unwatch` is called never reaches the sink.
#[derive(Clone)]
pub struct Emitter {
    dir: String,
    sink: Arc<dyn EventSink>,
    loader: ContentLoader,
    cancel: CancellationToken,
    metrics: Arc<WatchMetrics>,
}

impl Emitter {
    pub fn new(
        dir: String,
        sink: Arc<dyn EventSink>,
        loader: ContentLoader,
        cancel: CancellationToken,
        metrics: Arc<WatchMetrics>,
    ) -> Self {
        Self {
            dir,
            sink,
            loader,
            cancel,
            metrics,
        }
    }

    /// Emit an add or change, reading content when eligible.
    pub fn upsert(&self, kind: ChangeKind, key: &str, entry: &SnapshotEntry) {
        if !self.is_live() {
            return;
        }

        let content = self.loader.load(&entry.path);
        if content.is_none() && self.loader.is_eligible(&entry.path) {
            self.metrics.content_errors.fetch_add(1, Ordering::Relaxed);
        }

        let counter = match kind {
            ChangeKind::Add => &self.metrics.added,
            _ => &self.metrics.changed,
        };

        self.deliver(
            ChangeEvent::upsert(kind, key.to_string(), self.dir.clone(), &entry.record, content),
            counter,
        );
    }

    /// Emit a confirmed deletion.
    pub fn unlink(&self, key: &str) {
        self.deliver(
            ChangeEvent::unlink(key.to_string(), self.dir.clone()),
            &self.metrics.unlinked,
        );
    }

    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn deliver(&self, event: ChangeEvent, counter: &AtomicU64) {
        if !self.is_live() {
            debug!(path = %event.path, event = %event.kind, "Session stopped, dropping event");
            return;
        }

        debug!(path = %event.path, event = %event.kind, "Emitting event");
        counter.fetch_add(1, Ordering::Relaxed);
        self.sink.deliver(event);
    }
}
