//! Watch sessions: lifecycle, scheduling, and debounced deletions.
//!
//! A [`Watcher`] runs at most one session. Starting a session walks the
//! tree once to build a silent baseline, then hands the snapshot to a
//! dedicated worker task that re-walks on every tick, diffs against the
//! stored snapshot, emits adds and changes immediately, and defers
//! deletions through a single delay queue.

use crate::content::ContentLoader;
use crate::diff::diff;
use crate::emitter::Emitter;
use crate::event::{ChangeKind, EventSink};
use crate::metrics::{MetricsSnapshot, WatchMetrics};
use crate::path::{locate_file, resolve_root, root_uri};
use crate::registry::DirectoryRegistry;
use crate::snapshot::{FileRecord, Snapshot};
use crate::walker::{WalkRules, Walker};
use crate::{Strategy, WatchError, WatchOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::poll_fn;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`Watcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Baseline walk in progress
    Starting,
    Running,
    Stopped,
}

struct ActiveSession {
    id: u64,
    root: PathBuf,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

struct Lifecycle {
    state: SessionState,
    next_id: u64,
    session: Option<ActiveSession>,
}

/// Polling directory watcher with a single injected event sink.
pub struct Watcher {
    options: WatchOptions,
    sink: Arc<dyn EventSink>,
    metrics: Arc<WatchMetrics>,
    lifecycle: Mutex<Lifecycle>,
}

impl Watcher {
    /// Create an idle watcher.
    pub fn new(options: WatchOptions, sink: Arc<dyn EventSink>) -> Self {
        Self {
            options,
            sink,
            metrics: Arc::new(WatchMetrics::new()),
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                next_id: 0,
                session: None,
            }),
        }
    }

    /// Start watching `input`, a bare path or `file://` URI.
    ///
    /// Returns once the baseline snapshot is stored and the worker is
    /// running. No events are emitted for files present at this point
    /// unless `emit_initial` is set. Must be called within a Tokio runtime.
    pub async fn watch(&self, input: &str) -> Result<(), WatchError> {
        // A second call reports the running session even with a bad root
        let busy = already_watching(&self.lifecycle.lock());
        if let Some(err) = busy {
            return Err(err);
        }

        let root = {
            let input = input.to_string();
            tokio::task::spawn_blocking(move || resolve_root(&input)).await??
        };

        let start = self.reserve(&root)?;
        let state = self.baseline(&root, &start.cancel).await?;

        let mut lifecycle = self.lifecycle.lock();
        if start.cancel.is_cancelled() || !is_current(&lifecycle, start.id) {
            // unwatch() arrived during the baseline walk
            debug!(root = ?root, "Session stopped before start");
            return Ok(());
        }
        let cancel = start.disarm();

        // Subscribed before returning so no early edit slips past the hints
        let wake = Arc::new(Notify::new());
        let registry = match self.options.strategy {
            Strategy::Poll => None,
            Strategy::Hybrid => match DirectoryRegistry::new(wake.clone()) {
                Ok(mut registry) => {
                    registry.sync(state.current.dirs());
                    Some(registry)
                }
                Err(e) => {
                    warn!(error = %e, "Native hints unavailable, polling only");
                    None
                }
            },
        };

        let worker = Worker {
            state: Arc::new(Mutex::new(state)),
            options: self.options.clone(),
            cancel: cancel.clone(),
            metrics: self.metrics.clone(),
            registry,
            wake,
        };
        let handle = tokio::spawn(worker.run());

        if let Some(active) = lifecycle.session.as_mut() {
            active.worker = Some(handle);
        }
        lifecycle.state = SessionState::Running;

        info!(
            root = %root.display(),
            interval_ms = self.options.poll_interval_ms,
            strategy = ?self.options.strategy,
            "Started watching"
        );

        Ok(())
    }

    /// Stop the current session without waiting for the worker to exit.
    ///
    /// Idempotent. Pending deletions are discarded, and nothing is
    /// delivered to the sink after this returns.
    pub fn unwatch(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(active) = lifecycle.session.take() {
            active.cancel.cancel();
            lifecycle.state = SessionState::Stopped;
            info!(root = %active.root.display(), "Stopped watching");
        }
    }

    /// Stop the current session and wait for its worker to finish.
    pub async fn shutdown(&self) {
        let worker = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.session.as_mut().and_then(|a| a.worker.take())
        };
        self.unwatch();

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Watch worker ended abnormally");
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    pub fn is_watching(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Starting | SessionState::Running
        )
    }

    /// Canonical root of the current session.
    pub fn root(&self) -> Option<PathBuf> {
        self.lifecycle
            .lock()
            .session
            .as_ref()
            .map(|a| a.root.clone())
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Claim the session slot for `root`, released again unless startup
    /// completes.
    fn reserve(&self, root: &Path) -> Result<StartGuard<'_>, WatchError> {
        let mut lifecycle = self.lifecycle.lock();
        if let Some(err) = already_watching(&lifecycle) {
            return Err(err);
        }

        let cancel = CancellationToken::new();
        let id = lifecycle.next_id;
        lifecycle.next_id += 1;
        lifecycle.state = SessionState::Starting;
        lifecycle.session = Some(ActiveSession {
            id,
            root: root.to_path_buf(),
            cancel: cancel.clone(),
            worker: None,
        });

        Ok(StartGuard {
            lifecycle: &self.lifecycle,
            id,
            cancel,
            armed: true,
        })
    }

    async fn baseline(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<TickState, WatchError> {
        let walker = Walker::new(root, WalkRules::from_options(&self.options));
        let emitter = Emitter::new(
            root_uri(root),
            self.sink.clone(),
            ContentLoader::new(self.options.content_extensions.iter().cloned()),
            cancel.clone(),
            self.metrics.clone(),
        );
        let emit_initial = self.options.emit_initial;
        let metrics = self.metrics.clone();

        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let report = walker.walk()?;
            metrics
                .walk_errors
                .fetch_add(report.errors as u64, Ordering::Relaxed);

            if emit_initial {
                for (key, entry) in report.snapshot.iter() {
                    emitter.upsert(ChangeKind::Add, key, entry);
                }
            }

            debug!(
                files = report.snapshot.len(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "Baseline snapshot captured"
            );

            Ok(TickState {
                walker,
                emitter,
                current: report.snapshot,
                tombstones: HashMap::new(),
                metrics,
            })
        })
        .await?
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(active) = self.lifecycle.get_mut().session.take() {
            active.cancel.cancel();
        }
    }
}

fn is_current(lifecycle: &Lifecycle, id: u64) -> bool {
    lifecycle.session.as_ref().map_or(false, |a| a.id == id)
}

fn already_watching(lifecycle: &Lifecycle) -> Option<WatchError> {
    lifecycle
        .session
        .as_ref()
        .map(|active| WatchError::AlreadyWatching(active.root.display().to_string()))
}

/// A reserved session slot. Dropped while armed (startup failed, or the
/// `watch` future was abandoned), it cancels the session and frees the slot.
struct StartGuard<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    id: u64,
    cancel: CancellationToken,
    armed: bool,
}

impl StartGuard<'_> {
    /// Keep the session; returns its cancellation token.
    fn disarm(mut self) -> CancellationToken {
        self.armed = false;
        self.cancel.clone()
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        self.cancel.cancel();
        let mut lifecycle = self.lifecycle.lock();
        if is_current(&lifecycle, self.id) {
            lifecycle.session = None;
            lifecycle.state = SessionState::Idle;
            debug!("Session start abandoned");
        }
    }
}

/// A deletion waiting out the debounce delay, or one the delay revoked.
#[derive(Debug)]
struct Tombstone {
    path: PathBuf,
    record: FileRecord,
    /// `None` once the timer fired and found the file back on disk
    timer: Option<delay_queue::Key>,
}

/// Follow-up work for the scheduler after a tick.
#[derive(Debug, Default)]
struct TickOutcome {
    /// Keys to schedule for deletion
    removed: Vec<String>,
    /// Timers made obsolete by files that reappeared
    cancelled: Vec<delay_queue::Key>,
}

/// Everything a tick reads and writes. Only the session worker touches it.
struct TickState {
    walker: Walker,
    emitter: Emitter,
    current: Snapshot,
    tombstones: HashMap<String, Tombstone>,
    metrics: Arc<WatchMetrics>,
}

impl TickState {
    /// Walk, diff, emit adds and changes, and replace the snapshot.
    fn tick(&mut self) -> TickOutcome {
        let started = Instant::now();
        let mut outcome = TickOutcome::default();

        let report = match self.walker.walk() {
            Ok(report) => report,
            Err(e) => {
                warn!(root = ?self.walker.root(), error = %e, "Walk failed, keeping previous snapshot");
                self.metrics.record_skipped_tick();
                return outcome;
            }
        };
        let next = report.snapshot;
        let changes = diff(&self.current, &next);

        for key in &changes.changed {
            if let Some(entry) = next.get(key) {
                self.emitter.upsert(ChangeKind::Change, key, entry);
            }
        }

        for key in &changes.added {
            let Some(entry) = next.get(key) else {
                continue;
            };

            match self.tombstones.remove(key) {
                Some(tombstone) => {
                    if let Some(timer) = tombstone.timer {
                        outcome.cancelled.push(timer);
                    }
                    if tombstone.record != entry.record {
                        self.emitter.upsert(ChangeKind::Change, key, entry);
                    } else {
                        debug!(path = %key, "Reappeared unchanged");
                    }
                }
                None => self.emitter.upsert(ChangeKind::Add, key, entry),
            }
        }

        // Revoked deletions whose file is gone again need a fresh timer
        for (key, tombstone) in &self.tombstones {
            if tombstone.timer.is_none() && !next.contains(key) {
                outcome.removed.push(key.clone());
            }
        }

        for key in changes.removed {
            if let Some(entry) = self.current.get(&key) {
                self.tombstones.insert(
                    key.clone(),
                    Tombstone {
                        path: entry.path.clone(),
                        record: entry.record,
                        timer: None,
                    },
                );
                outcome.removed.push(key);
            }
        }

        debug!(
            added = changes.added.len(),
            changed = changes.changed.len(),
            removed = outcome.removed.len(),
            files = next.len(),
            "Tick complete"
        );

        self.current = next;
        self.metrics.record_tick(started.elapsed(), report.errors);

        outcome
    }

    fn arm(&mut self, key: &str, timer: delay_queue::Key) {
        if let Some(tombstone) = self.tombstones.get_mut(key) {
            tombstone.timer = Some(timer);
        }
    }
}

/// Background worker owning one session's tick state.
struct Worker {
    state: Arc<Mutex<TickState>>,
    options: WatchOptions,
    cancel: CancellationToken,
    metrics: Arc<WatchMetrics>,
    registry: Option<DirectoryRegistry>,
    wake: Arc<Notify>,
}

impl Worker {
    async fn run(mut self) {
        let interval = self.options.poll_interval();
        let debounce = self.options.delete_debounce();
        let wake = self.wake.clone();
        let mut registry = self.registry.take();
        let mut queue: DelayQueue<String> = DelayQueue::new();

        let mut next_tick = tokio::time::Instant::now() + interval;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(expired) = poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                    self.confirm_deletion(expired.into_inner()).await;
                    continue;
                }

                _ = tokio::time::sleep_until(next_tick) => {}

                _ = wake.notified(), if registry.is_some() => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.options.native_settle()) => {}
                    }
                }
            }

            let state = self.state.clone();
            let tick = tokio::task::spawn_blocking(move || state.lock().tick());
            let outcome = match tick.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Tick aborted");
                    self.metrics.record_skipped_tick();
                    TickOutcome::default()
                }
            };

            self.schedule(&mut queue, outcome, debounce);

            if let Some(registry) = registry.as_mut() {
                let summary = registry.sync(self.state.lock().current.dirs());
                if summary.subscribed + summary.released > 0 {
                    debug!(?summary, "Directory subscriptions updated");
                }
            }

            next_tick = tokio::time::Instant::now() + interval;
        }

        debug!(pending = queue.len(), "Watch worker exiting");
    }

    fn schedule(&self, queue: &mut DelayQueue<String>, outcome: TickOutcome, debounce: Duration) {
        for timer in &outcome.cancelled {
            queue.try_remove(timer);
        }

        let mut state = self.state.lock();
        for key in outcome.removed {
            debug!(path = %key, delay_ms = debounce.as_millis() as u64, "Deferring unlink");
            let timer = queue.insert(key.clone(), debounce);
            state.arm(&key, timer);
        }
    }

    /// Debounce expired: emit the unlink unless the file is back under
    /// any spelling of its key.
    async fn confirm_deletion(&self, key: String) {
        let (root, path) = {
            let mut state = self.state.lock();
            let root = state.walker.root().to_path_buf();
            match state.tombstones.get_mut(&key) {
                Some(tombstone) => {
                    tombstone.timer = None;
                    (root, tombstone.path.clone())
                }
                None => return,
            }
        };

        let lookup = key.clone();
        let exists = match tokio::task::spawn_blocking(move || {
            path.is_file() || locate_file(&root, &lookup).is_some()
        })
        .await
        {
            Ok(exists) => exists,
            Err(e) => {
                // Left revoked; the next tick re-schedules it if still absent
                warn!(path = %key, error = %e, "Deletion check failed");
                return;
            }
        };

        if exists {
            debug!(path = %key, "File reappeared, unlink suppressed");
            self.metrics
                .unlinks_suppressed
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut state = self.state.lock();
        state.tombstones.remove(&key);
        state.emitter.unlink(&key);
    }
}
