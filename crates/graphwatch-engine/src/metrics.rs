//! Counters for watch sessions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counters shared by a watcher and its session worker.
#[derive(Debug, Default)]
pub struct WatchMetrics {
    /// Ticks that completed a walk and diff
    pub ticks: AtomicU64,
    /// Ticks abandoned because the root could not be walked
    pub ticks_skipped: AtomicU64,
    pub added: AtomicU64,
    pub changed: AtomicU64,
    pub unlinked: AtomicU64,
    /// Deletions dropped because the file was back when the debounce expired
    pub unlinks_suppressed: AtomicU64,
    /// Files or directories skipped during walks
    pub walk_errors: AtomicU64,
    /// Eligible files whose content could not be read
    pub content_errors: AtomicU64,
    /// Duration of the most recent tick in microseconds
    pub last_tick_us: AtomicU64,
}

impl WatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed tick.
    pub fn record_tick(&self, elapsed: Duration, walk_errors: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.walk_errors
            .fetch_add(walk_errors as u64, Ordering::Relaxed);
        self.last_tick_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_skipped_tick(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            added: self.added.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
            unlinked: self.unlinked.load(Ordering::Relaxed),
            unlinks_suppressed: self.unlinks_suppressed.load(Ordering::Relaxed),
            walk_errors: self.walk_errors.load(Ordering::Relaxed),
            content_errors: self.content_errors.load(Ordering::Relaxed),
            last_tick_us: self.last_tick_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WatchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub ticks_skipped: u64,
    pub added: u64,
    pub changed: u64,
    pub unlinked: u64,
    pub unlinks_suppressed: u64,
    pub walk_errors: u64,
    pub content_errors: u64,
    pub last_tick_us: u64,
}
