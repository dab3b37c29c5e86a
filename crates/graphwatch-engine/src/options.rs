//! Watch session options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the scheduler decides when to run a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Re-walk on a fixed interval only
    #[default]
    Poll,
    /// Fixed interval, plus early ticks woken by native directory events
    Hybrid,
}

/// Options for a watch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Delay between ticks in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before a detected deletion is confirmed, in milliseconds
    #[serde(default = "default_delete_debounce_ms")]
    pub delete_debounce_ms: u64,

    /// Directory names never descended into (dot-directories are always skipped)
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,

    /// Bookkeeping file names that never appear in snapshots or events
    #[serde(default = "default_reserved_files")]
    pub reserved_files: Vec<String>,

    /// Extensions whose content is attached to add/change events
    #[serde(default = "default_content_extensions")]
    pub content_extensions: Vec<String>,

    /// Descend through symbolic links
    #[serde(default)]
    pub follow_links: bool,

    /// Emit an `add` for every file found by the baseline walk
    #[serde(default)]
    pub emit_initial: bool,

    /// Tick scheduling strategy
    #[serde(default)]
    pub strategy: Strategy,

    /// Settle time between a native event and the early tick it triggers
    #[serde(default = "default_native_settle_ms")]
    pub native_settle_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_delete_debounce_ms() -> u64 {
    500
}

fn default_excluded_dirs() -> Vec<String> {
    ["bak", "version-files", "node_modules"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_reserved_files() -> Vec<String> {
    ["graphs-txid.edn", "broken-config.edn"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_content_extensions() -> Vec<String> {
    ["md", "markdown", "org", "js", "edn", "css", "excalidraw"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_native_settle_ms() -> u64 {
    200
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            delete_debounce_ms: default_delete_debounce_ms(),
            excluded_dirs: default_excluded_dirs(),
            reserved_files: default_reserved_files(),
            content_extensions: default_content_extensions(),
            follow_links: false,
            emit_initial: false,
            strategy: Strategy::default(),
            native_settle_ms: default_native_settle_ms(),
        }
    }
}

impl WatchOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn delete_debounce(&self) -> Duration {
        Duration::from_millis(self.delete_debounce_ms)
    }

    pub fn native_settle(&self) -> Duration {
        Duration::from_millis(self.native_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_options_default() {
        let options = WatchOptions::default();
        assert_eq!(options.poll_interval(), Duration::from_secs(2));
        assert_eq!(options.delete_debounce(), Duration::from_millis(500));
        assert_eq!(options.strategy, Strategy::Poll);
        assert!(options.excluded_dirs.contains(&"node_modules".to_string()));
        assert!(options.reserved_files.contains(&"graphs-txid.edn".to_string()));
        assert!(!options.emit_initial);
    }

    #[test]
    fn test_partial_options_use_defaults() {
        let options: WatchOptions =
            serde_json::from_str(r#"{"poll_interval_ms": 100, "strategy": "hybrid"}"#).unwrap();
        assert_eq!(options.poll_interval_ms, 100);
        assert_eq!(options.strategy, Strategy::Hybrid);
        assert_eq!(options.delete_debounce_ms, 500);
        assert_eq!(options.content_extensions.len(), 7);
    }
}
