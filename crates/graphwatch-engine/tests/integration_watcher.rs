//! Integration tests for watch sessions against real directories.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

use graphwatch_engine::{
    ChangeEvent, ChangeKind, SessionState, Strategy, WatchError, WatchOptions, Watcher,
};

fn fast_options() -> WatchOptions {
    WatchOptions {
        poll_interval_ms: 50,
        delete_debounce_ms: 300,
        ..WatchOptions::default()
    }
}

fn watcher_with(options: WatchOptions) -> (Watcher, mpsc::UnboundedReceiver<ChangeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Watcher::new(options, Arc::new(tx)), rx)
}

/// Wait for the next event or fail after `limit`.
async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>, limit: Duration) -> ChangeEvent {
    tokio::time::timeout(limit, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("sink closed")
}

/// Collect everything delivered during `window`.
async fn collect_for(
    rx: &mut mpsc::UnboundedReceiver<ChangeEvent>,
    window: Duration,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        events.push(event);
    }
    events
}

fn root_of(dir: &tempfile::TempDir) -> String {
    dir.path().to_str().unwrap().to_string()
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Start watch, modify, delete: silent baseline, one change, one unlink.
#[tokio::test]
async fn test_modify_then_delete_scenario() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), "a.md", "- one");

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();
    assert_eq!(watcher.state(), SessionState::Running);

    assert!(collect_for(&mut rx, Duration::from_millis(200)).await.is_empty());

    write(temp_dir.path(), "a.md", "- one\n- two");
    let event = next_event(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(event.kind, ChangeKind::Change);
    assert_eq!(event.path, "a.md");
    assert_eq!(event.content.as_deref(), Some("- one\n- two"));
    assert_eq!(event.stat.unwrap().size, 11);
    assert!(event.dir.starts_with("file://"));

    fs::remove_file(temp_dir.path().join("a.md")).unwrap();
    let event = next_event(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(event.kind, ChangeKind::Unlink);
    assert_eq!(event.path, "a.md");
    assert!(event.stat.is_none());
    assert!(event.content.is_none());

    assert!(collect_for(&mut rx, Duration::from_millis(500)).await.is_empty());
    watcher.shutdown().await;
}

/// A file in a new directory yields one add and nothing for the directory.
#[tokio::test]
async fn test_new_directory_file_is_single_add() {
    let temp_dir = tempdir().unwrap();

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    write(temp_dir.path(), "sub/b.md", "b");

    let events = collect_for(&mut rx, Duration::from_millis(500)).await;
    assert_eq!(events.len(), 1, "events: {:?}", events);
    assert_eq!(events[0].kind, ChangeKind::Add);
    assert_eq!(events[0].path, "sub/b.md");
    assert_eq!(events[0].content.as_deref(), Some("b"));

    watcher.shutdown().await;
}

/// Non-eligible files still produce events, without content.
#[tokio::test]
async fn test_non_eligible_file_has_null_content() {
    let temp_dir = tempdir().unwrap();

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    write(temp_dir.path(), "assets/image.png", "png-bytes");

    let event = next_event(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(event.kind, ChangeKind::Add);
    assert_eq!(event.path, "assets/image.png");
    assert!(event.stat.is_some());
    assert!(event.content.is_none());

    watcher.shutdown().await;
}

/// Second watch without unwatch fails and leaves the first session running.
#[tokio::test]
async fn test_second_watch_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let other = tempdir().unwrap();

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    let err = watcher.watch(&root_of(&temp_dir)).await.unwrap_err();
    assert!(matches!(err, WatchError::AlreadyWatching(_)));
    let err = watcher.watch(&root_of(&other)).await.unwrap_err();
    assert!(matches!(err, WatchError::AlreadyWatching(_)));

    assert_eq!(watcher.state(), SessionState::Running);
    assert_eq!(
        watcher.root().unwrap(),
        temp_dir.path().canonicalize().unwrap()
    );

    write(temp_dir.path(), "still.md", "alive");
    let event = next_event(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(event.path, "still.md");

    watcher.shutdown().await;
}

/// Excluded directories, reserved names and dotfiles never surface.
#[tokio::test]
async fn test_excluded_paths_produce_no_events() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), "logseq/config.edn", "{}");

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    write(temp_dir.path(), "node_modules/pkg/index.js", "x");
    write(temp_dir.path(), "logseq/bak/pages/a.md", "x");
    write(temp_dir.path(), "logseq/version-files/a.md", "x");
    write(temp_dir.path(), ".git/HEAD", "ref");
    write(temp_dir.path(), "logseq/graphs-txid.edn", "[1 2]");
    write(temp_dir.path(), "logseq/broken-config.edn", "{");
    write(temp_dir.path(), ".DS_Store", "finder");
    write(temp_dir.path(), "pages/.a.md.icloud", "placeholder");

    assert!(collect_for(&mut rx, Duration::from_millis(400)).await.is_empty());

    write(temp_dir.path(), "logseq/graphs-txid.edn", "[1 2 3]");
    fs::remove_file(temp_dir.path().join("logseq/broken-config.edn")).unwrap();
    assert!(collect_for(&mut rx, Duration::from_millis(600)).await.is_empty());

    watcher.shutdown().await;
}

/// Delete then recreate inside the debounce window never yields an unlink or add.
#[tokio::test]
async fn test_recreate_within_debounce_suppresses_unlink() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), "a.md", "same");

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    fs::remove_file(temp_dir.path().join("a.md")).unwrap();
    // Long enough for a tick to see the deletion, short of the debounce
    tokio::time::sleep(Duration::from_millis(120)).await;
    write(temp_dir.path(), "a.md", "same but longer");

    let events = collect_for(&mut rx, Duration::from_millis(800)).await;
    assert!(
        events
            .iter()
            .all(|e| e.kind == ChangeKind::Change && e.path == "a.md"),
        "events: {:?}",
        events
    );
    assert!(events.len() <= 1);

    watcher.shutdown().await;
}

/// No unlink is delivered after unwatch, even if the debounce was pending.
#[tokio::test]
async fn test_unwatch_discards_pending_unlinks() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), "a.md", "a");

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    fs::remove_file(temp_dir.path().join("a.md")).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    watcher.unwatch();
    assert_eq!(watcher.state(), SessionState::Stopped);

    assert!(collect_for(&mut rx, Duration::from_millis(600)).await.is_empty());
}

/// unwatch is idempotent and a stopped watcher can watch again.
#[tokio::test]
async fn test_unwatch_idempotent_and_rewatch() {
    let temp_dir = tempdir().unwrap();

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.unwatch();
    assert_eq!(watcher.state(), SessionState::Idle);

    watcher.watch(&root_of(&temp_dir)).await.unwrap();
    watcher.unwatch();
    watcher.unwatch();
    assert_eq!(watcher.state(), SessionState::Stopped);
    assert!(!watcher.is_watching());
    assert!(watcher.root().is_none());

    watcher.watch(&root_of(&temp_dir)).await.unwrap();
    assert!(watcher.is_watching());

    write(temp_dir.path(), "after.md", "x");
    let event = next_event(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(event.path, "after.md");

    watcher.shutdown().await;
}

/// Bad roots are reported synchronously and leave the watcher idle.
#[tokio::test]
async fn test_invalid_roots_are_rejected() {
    let temp_dir = tempdir().unwrap();
    let (watcher, _rx) = watcher_with(fast_options());

    let err = watcher.watch("content://com.android/tree/x").await.unwrap_err();
    assert!(matches!(err, WatchError::UnsupportedScheme(_)));

    let missing = temp_dir.path().join("missing");
    let err = watcher.watch(missing.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, WatchError::InvalidPath(_)));

    assert_eq!(watcher.state(), SessionState::Idle);
}

/// `file://` roots are accepted and events carry the root URI.
#[tokio::test]
async fn test_file_uri_root() {
    let temp_dir = tempdir().unwrap();
    let canonical = temp_dir.path().canonicalize().unwrap();
    let uri = format!("file://{}", canonical.display());

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&uri).await.unwrap();

    write(&canonical, "pages/p.org", "* heading");
    let event = next_event(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(event.path, "pages/p.org");
    assert!(event.dir.ends_with('/'));
    assert_eq!(event.content.as_deref(), Some("* heading"));

    watcher.shutdown().await;
}

/// Decomposed Unicode names are reported in composed form.
#[tokio::test]
async fn test_event_paths_are_nfc() {
    let temp_dir = tempdir().unwrap();

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    write(temp_dir.path(), "cafe\u{301}.md", "x");
    let event = next_event(&mut rx, Duration::from_secs(2)).await;
    assert_eq!(event.path, "caf\u{e9}.md");

    watcher.shutdown().await;
}

/// With emit_initial the baseline reports existing files as adds.
#[tokio::test]
async fn test_emit_initial_reports_baseline() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), "a.md", "a");
    write(temp_dir.path(), "journals/2024_01_01.md", "j");

    let options = WatchOptions {
        emit_initial: true,
        ..fast_options()
    };
    let (watcher, mut rx) = watcher_with(options);
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    let mut paths: Vec<_> = collect_for(&mut rx, Duration::from_millis(300))
        .await
        .into_iter()
        .inspect(|e| assert_eq!(e.kind, ChangeKind::Add))
        .map(|e| e.path)
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["a.md", "journals/2024_01_01.md"]);

    watcher.shutdown().await;
}

/// Net effect of a burst of operations matches the final tree.
#[tokio::test]
async fn test_event_stream_reconstructs_final_state() {
    let temp_dir = tempdir().unwrap();
    write(temp_dir.path(), "keep.md", "k");
    write(temp_dir.path(), "edit.md", "e");
    write(temp_dir.path(), "drop.md", "d");

    let (watcher, mut rx) = watcher_with(fast_options());
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    write(temp_dir.path(), "edit.md", "edited");
    fs::remove_file(temp_dir.path().join("drop.md")).unwrap();
    write(temp_dir.path(), "pages/new.md", "n");
    fs::rename(
        temp_dir.path().join("keep.md"),
        temp_dir.path().join("pages/kept.md"),
    )
    .unwrap();

    let mut state: std::collections::BTreeSet<String> =
        ["keep.md", "edit.md", "drop.md"].iter().map(|s| s.to_string()).collect();
    for event in collect_for(&mut rx, Duration::from_millis(1200)).await {
        match event.kind {
            ChangeKind::Add | ChangeKind::Change => {
                state.insert(event.path);
            }
            ChangeKind::Unlink => {
                state.remove(&event.path);
            }
        }
    }

    let expected: std::collections::BTreeSet<String> = ["edit.md", "pages/new.md", "pages/kept.md"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(state, expected);

    let metrics = watcher.metrics();
    assert!(metrics.ticks > 0);
    assert_eq!(metrics.unlinked, 2);

    watcher.shutdown().await;
}

/// Native hints trigger a tick long before the poll interval.
#[tokio::test]
async fn test_hybrid_strategy_ticks_early() {
    let temp_dir = tempdir().unwrap();

    let options = WatchOptions {
        poll_interval_ms: 30_000,
        native_settle_ms: 50,
        strategy: Strategy::Hybrid,
        ..fast_options()
    };
    let (watcher, mut rx) = watcher_with(options);
    watcher.watch(&root_of(&temp_dir)).await.unwrap();

    write(temp_dir.path(), "hint.md", "h");
    let event = next_event(&mut rx, Duration::from_secs(5)).await;
    assert_eq!(event.kind, ChangeKind::Add);
    assert_eq!(event.path, "hint.md");

    watcher.shutdown().await;
}
